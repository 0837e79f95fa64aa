use async_trait::async_trait;
use idp_core::{Operation, ResourceKind, ResourceRef, StepExecutor, StepResult};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::collaborators::{
    Applied, ClusterClient, DeleteOptions, Deletion, Lookup, ObservedResource,
};
use crate::error::{ClusterError, ClusterResult};

/// Thin `kubectl` driver shared by the cluster and controller adapters.
#[derive(Clone)]
pub struct Kubectl {
    executor: Arc<dyn StepExecutor>,
    working_dir: PathBuf,
    context: Option<String>,
}

impl Kubectl {
    pub fn new(executor: Arc<dyn StepExecutor>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            working_dir: working_dir.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn command<I, S>(&self, args: I) -> Operation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut op = Operation::new("kubectl");
        if let Some(context) = &self.context {
            op = op.arg("--context").arg(context);
        }
        op.args(args)
    }

    /// Run without failing on non-zero exit.
    pub async fn probe(&self, op: &Operation) -> StepResult {
        self.executor.probe(op, &self.working_dir).await
    }

    /// Run and map any non-zero exit to a transport error.
    pub async fn run(&self, op: &Operation) -> ClusterResult<StepResult> {
        let result = self.probe(op).await;
        if result.success() {
            Ok(result)
        } else {
            Err(transport(&result))
        }
    }

    pub async fn get(&self, resource: &ResourceRef) -> ClusterResult<Lookup> {
        let mut args = vec![
            "get".to_string(),
            resource.kind.as_str().to_string(),
            resource.name.clone(),
        ];
        args.extend(namespace_args(resource));
        args.extend(["-o".to_string(), "json".to_string()]);

        let result = self.probe(&self.command(args)).await;
        if !result.success() {
            if is_not_found(&result.stderr) {
                return Ok(Lookup::NotFound);
            }
            return Err(transport(&result));
        }

        let object: Value = serde_json::from_str(&result.stdout).map_err(|e| ClusterError::Parse {
            operation: result.command.clone(),
            reason: e.to_string(),
        })?;
        Ok(Lookup::Found(observe(resource.kind, &object)))
    }

    pub async fn delete(
        &self,
        resource: &ResourceRef,
        options: DeleteOptions,
    ) -> ClusterResult<Deletion> {
        let mut args = vec![
            "delete".to_string(),
            resource.kind.as_str().to_string(),
            resource.name.clone(),
        ];
        args.extend(namespace_args(resource));
        args.push(format!("--wait={}", options.wait));
        if options.force {
            args.extend(["--force".to_string(), "--grace-period=0".to_string()]);
        }

        let result = self.probe(&self.command(args)).await;
        if result.success() {
            Ok(Deletion::Requested)
        } else if is_not_found(&result.stderr) {
            debug!(resource = %resource, "Already absent");
            Ok(Deletion::AlreadyAbsent)
        } else {
            Err(transport(&result))
        }
    }
}

fn namespace_args(resource: &ResourceRef) -> Vec<String> {
    match &resource.namespace {
        Some(ns) if !resource.kind.is_cluster_scoped() => vec!["-n".to_string(), ns.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn transport(result: &StepResult) -> ClusterError {
    ClusterError::Transport {
        operation: result.command.clone(),
        stderr: result.stderr.trim().to_string(),
    }
}

pub(crate) fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains("not found")
}

pub(crate) fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("AlreadyExists") || stderr.contains("already exists")
}

fn is_timeout(stderr: &str) -> bool {
    stderr.contains("timed out")
}

/// Project a `kubectl get -o json` object onto terminating/ready flags.
fn observe(kind: ResourceKind, object: &Value) -> ObservedResource {
    let phase = object
        .pointer("/status/phase")
        .and_then(Value::as_str)
        .map(str::to_string);
    let terminating =
        object.pointer("/metadata/deletionTimestamp").is_some() || phase.as_deref() == Some("Terminating");

    let ready = match kind {
        ResourceKind::Deployment => {
            let desired = object.pointer("/spec/replicas").and_then(Value::as_u64).unwrap_or(1);
            let ready = object
                .pointer("/status/readyReplicas")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            ready >= desired
        }
        ResourceKind::PersistentVolume => matches!(phase.as_deref(), Some("Bound" | "Available")),
        ResourceKind::PersistentVolumeClaim => phase.as_deref() == Some("Bound"),
        ResourceKind::Pod => phase.as_deref() == Some("Running"),
        ResourceKind::Namespace => phase.as_deref() == Some("Active"),
        ResourceKind::Application => {
            object.pointer("/status/health/status").and_then(Value::as_str) == Some("Healthy")
        }
        ResourceKind::Service | ResourceKind::ConfigMap => true,
    };

    ObservedResource {
        terminating,
        ready,
        phase,
    }
}

/// [`ClusterClient`] backed by `kubectl`.
pub struct KubectlCluster {
    kubectl: Kubectl,
}

impl KubectlCluster {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl ClusterClient for KubectlCluster {
    async fn create_namespace(&self, name: &str) -> ClusterResult<Applied> {
        let result = self
            .kubectl
            .probe(&self.kubectl.command(["create", "namespace", name]))
            .await;

        if result.success() {
            Ok(Applied::Created)
        } else if is_already_exists(&result.stderr) {
            Ok(Applied::AlreadyExists)
        } else {
            Err(transport(&result))
        }
    }

    async fn apply_manifest(&self, manifest: &str) -> ClusterResult<()> {
        let op = self.kubectl.command(["apply", "-f", "-"]).stdin(manifest);
        self.kubectl.run(&op).await?;
        Ok(())
    }

    async fn delete_resource(
        &self,
        resource: &ResourceRef,
        options: DeleteOptions,
    ) -> ClusterResult<Deletion> {
        self.kubectl.delete(resource, options).await
    }

    async fn get_resource(&self, resource: &ResourceRef) -> ClusterResult<Lookup> {
        self.kubectl.get(resource).await
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> ClusterResult<Vec<ResourceRef>> {
        let mut args = vec!["get".to_string(), kind.as_str().to_string()];
        match namespace {
            Some(ns) => args.extend(["-n".to_string(), ns.to_string()]),
            None if !kind.is_cluster_scoped() => args.push("--all-namespaces".to_string()),
            None => {}
        }
        if let Some(selector) = selector {
            args.extend(["-l".to_string(), selector.to_string()]);
        }
        args.extend(["-o".to_string(), "json".to_string()]);

        let result = self.kubectl.run(&self.kubectl.command(args)).await?;
        let list: Value = serde_json::from_str(&result.stdout).map_err(|e| ClusterError::Parse {
            operation: result.command.clone(),
            reason: e.to_string(),
        })?;

        let items = list.get("items").and_then(Value::as_array);
        Ok(items
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let name = item.pointer("/metadata/name").and_then(Value::as_str)?;
                Some(match item.pointer("/metadata/namespace").and_then(Value::as_str) {
                    Some(ns) => ResourceRef::namespaced(kind, name, ns),
                    None => ResourceRef::cluster(kind, name),
                })
            })
            .collect())
    }

    async fn wait_for_condition(
        &self,
        resource: &ResourceRef,
        condition: &str,
        timeout: Duration,
    ) -> ClusterResult<bool> {
        let mut args = vec![
            "wait".to_string(),
            format!("{}/{}", resource.kind.as_str(), resource.name),
        ];
        args.extend(namespace_args(resource));
        args.push(format!("--for={}", condition));
        args.push(format!("--timeout={}s", timeout.as_secs()));

        let result = self.kubectl.probe(&self.kubectl.command(args)).await;
        if result.success() {
            Ok(true)
        } else if is_not_found(&result.stderr) {
            Ok(condition == "delete")
        } else if is_timeout(&result.stderr) {
            Ok(false)
        } else {
            Err(transport(&result))
        }
    }

    async fn restart_workload(&self, resource: &ResourceRef) -> ClusterResult<()> {
        let mut args = vec![
            "rollout".to_string(),
            "restart".to_string(),
            format!("{}/{}", resource.kind.as_str(), resource.name),
        ];
        args.extend(namespace_args(resource));
        self.kubectl.run(&self.kubectl.command(args)).await?;
        Ok(())
    }

    async fn find_pod(&self, namespace: &str, selector: &str) -> ClusterResult<Option<String>> {
        let op = self.kubectl.command([
            "get",
            "pods",
            "-n",
            namespace,
            "-l",
            selector,
            "--field-selector=status.phase=Running",
            "-o",
            "json",
        ]);
        let result = self.kubectl.run(&op).await?;

        let list: Value = serde_json::from_str(&result.stdout).map_err(|e| ClusterError::Parse {
            operation: result.command.clone(),
            reason: e.to_string(),
        })?;
        Ok(list
            .pointer("/items/0/metadata/name")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        command: &[String],
    ) -> ClusterResult<StepResult> {
        let op = self
            .kubectl
            .command(["exec", "-n", namespace, pod, "--"])
            .args(command.iter().cloned());
        Ok(self.kubectl.probe(&op).await)
    }
}
