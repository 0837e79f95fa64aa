use async_trait::async_trait;
use idp_core::{ExecutionError, Operation, StepExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::collaborators::{DashboardDescriptor, DashboardProvisioner};

/// Dashboards as Terraform resources, targeted one at a time.
pub struct TerraformDashboards {
    executor: Arc<dyn StepExecutor>,
    terraform_dir: PathBuf,
}

impl TerraformDashboards {
    pub fn new(executor: Arc<dyn StepExecutor>, terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            terraform_dir: terraform_dir.into(),
        }
    }

    async fn ensure_initialized(&self) -> Result<(), ExecutionError> {
        if self.terraform_dir.join(".terraform").is_dir() {
            return Ok(());
        }
        debug!(dir = %self.terraform_dir.display(), "Initializing terraform");
        let op = Operation::new("terraform").args(["init", "-input=false"]);
        self.executor.run(&op, &self.terraform_dir).await?;
        Ok(())
    }

    fn targeted(action: &str, dashboard: &DashboardDescriptor) -> Operation {
        Operation::new("terraform")
            .args([action, "-auto-approve", "-input=false"])
            .arg(format!("-target={}", dashboard.resource))
    }
}

#[async_trait]
impl DashboardProvisioner for TerraformDashboards {
    async fn apply(&self, dashboard: &DashboardDescriptor) -> Result<(), ExecutionError> {
        self.ensure_initialized().await?;
        self.executor
            .run(&Self::targeted("apply", dashboard), &self.terraform_dir)
            .await?;
        Ok(())
    }

    async fn destroy(&self, dashboard: &DashboardDescriptor) -> Result<(), ExecutionError> {
        self.ensure_initialized().await?;
        self.executor
            .run(&Self::targeted("destroy", dashboard), &self.terraform_dir)
            .await?;
        Ok(())
    }
}
