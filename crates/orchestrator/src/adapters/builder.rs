use async_trait::async_trait;
use idp_core::{ExecutionError, Operation, StepExecutor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collaborators::ContainerBuilder;

/// Builds with `docker` and loads images into a local `kind` cluster.
pub struct DockerKindBuilder {
    executor: Arc<dyn StepExecutor>,
    working_dir: PathBuf,
    kind_cluster: String,
}

impl DockerKindBuilder {
    pub fn new(
        executor: Arc<dyn StepExecutor>,
        working_dir: impl Into<PathBuf>,
        kind_cluster: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            working_dir: working_dir.into(),
            kind_cluster: kind_cluster.into(),
        }
    }
}

#[async_trait]
impl ContainerBuilder for DockerKindBuilder {
    async fn build(&self, image_tag: &str, build_context: &Path) -> Result<(), ExecutionError> {
        let op = Operation::new("docker")
            .args(["build", "-t", image_tag])
            .arg(build_context.to_string_lossy());
        self.executor.run(&op, &self.working_dir).await?;
        Ok(())
    }

    async fn import_into_cluster(&self, image_tag: &str) -> Result<(), ExecutionError> {
        let op = Operation::new("kind").args([
            "load",
            "docker-image",
            image_tag,
            "--name",
            self.kind_cluster.as_str(),
        ]);
        self.executor.run(&op, &self.working_dir).await?;
        Ok(())
    }
}
