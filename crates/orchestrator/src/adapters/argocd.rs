use async_trait::async_trait;
use idp_core::{ResourceKind, ResourceRef};
use serde_json::Value;
use std::path::Path;

use super::kubectl::{is_not_found, transport, Kubectl};
use crate::collaborators::{DeclarativeConfigController, DeleteOptions, Deletion, Lookup};
use crate::error::ClusterResult;

const REFRESH_ANNOTATION: &str = "argocd.argoproj.io/refresh=hard";

/// Argo CD `Application` objects, managed through `kubectl`.
pub struct ArgoCdController {
    kubectl: Kubectl,
    namespace: String,
}

impl ArgoCdController {
    pub fn new(kubectl: Kubectl, namespace: impl Into<String>) -> Self {
        Self {
            kubectl,
            namespace: namespace.into(),
        }
    }

    fn application(&self, name: &str) -> ResourceRef {
        ResourceRef::namespaced(ResourceKind::Application, name, &self.namespace)
    }
}

/// Expand `spec.syncPolicy.automated` into a nested merge patch.
fn merge_patch(field: &str, value: Value) -> Value {
    field
        .split('.')
        .rev()
        .fold(value, |inner, key| {
            let mut object = serde_json::Map::new();
            object.insert(key.to_string(), inner);
            Value::Object(object)
        })
}

#[async_trait]
impl DeclarativeConfigController for ArgoCdController {
    async fn apply(&self, descriptor: &Path) -> ClusterResult<()> {
        let op = self
            .kubectl
            .command(["apply", "-n", self.namespace.as_str(), "-f"])
            .arg(descriptor.to_string_lossy());
        self.kubectl.run(&op).await?;
        Ok(())
    }

    async fn force_refresh(&self, name: &str) -> ClusterResult<()> {
        let op = self.kubectl.command([
            "annotate",
            "application",
            name,
            "-n",
            self.namespace.as_str(),
            REFRESH_ANNOTATION,
            "--overwrite",
        ]);
        self.kubectl.run(&op).await?;
        Ok(())
    }

    async fn delete(&self, name: &str, options: DeleteOptions) -> ClusterResult<Deletion> {
        self.kubectl.delete(&self.application(name), options).await
    }

    async fn patch(&self, name: &str, field: &str, value: Value) -> ClusterResult<bool> {
        let patch = merge_patch(field, value);
        let op = self
            .kubectl
            .command([
                "patch",
                "application",
                name,
                "-n",
                self.namespace.as_str(),
                "--type=merge",
                "-p",
            ])
            .arg(patch.to_string());

        let result = self.kubectl.probe(&op).await;
        if result.success() {
            Ok(true)
        } else if is_not_found(&result.stderr) {
            Ok(false)
        } else {
            Err(transport(&result))
        }
    }

    async fn get(&self, name: &str) -> ClusterResult<Lookup> {
        self.kubectl.get(&self.application(name)).await
    }
}
