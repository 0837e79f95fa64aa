//! Interfaces of the external systems the lifecycle pipelines drive.
//!
//! Each trait is independently mockable; the command-backed implementations
//! live in [`crate::adapters`].

use async_trait::async_trait;
use idp_core::{
    ExecutionError, ResourceKind, ResourceRef, ResourceState, ServiceDescriptor, StepResult,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ClusterResult;

/// Observed status of an object that exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedResource {
    /// Deletion has been requested but not completed (finalizers pending).
    pub terminating: bool,
    /// The object reports itself ready (replicas available, volume bound, ...).
    pub ready: bool,
    pub phase: Option<String>,
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    Found(ObservedResource),
}

impl Lookup {
    pub fn exists(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Project a single observation onto the logical state model.
    pub fn state(&self) -> ResourceState {
        match self {
            Lookup::NotFound => ResourceState::Absent,
            Lookup::Found(observed) if observed.terminating => ResourceState::Terminating,
            Lookup::Found(observed) if observed.ready => ResourceState::Active,
            Lookup::Found(_) => ResourceState::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// Deletion was accepted; it may complete asynchronously.
    Requested,
    AlreadyAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    /// Block until the object is gone.
    pub wait: bool,
    /// Skip graceful termination.
    pub force: bool,
}

impl DeleteOptions {
    pub fn background() -> Self {
        Self {
            wait: false,
            force: false,
        }
    }

    pub fn forced() -> Self {
        Self {
            wait: false,
            force: true,
        }
    }
}

#[async_trait]
pub trait ContainerBuilder: Send + Sync {
    async fn build(&self, image_tag: &str, build_context: &Path) -> Result<(), ExecutionError>;

    /// Load a locally built image into the cluster's image cache.
    async fn import_into_cluster(&self, image_tag: &str) -> Result<(), ExecutionError>;
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_namespace(&self, name: &str) -> ClusterResult<Applied>;

    async fn delete_namespace(&self, name: &str) -> ClusterResult<Deletion> {
        self.delete_resource(&ResourceRef::namespace(name), DeleteOptions::background())
            .await
    }

    /// Create or update the objects described by a manifest.
    async fn apply_manifest(&self, manifest: &str) -> ClusterResult<()>;

    async fn delete_resource(
        &self,
        resource: &ResourceRef,
        options: DeleteOptions,
    ) -> ClusterResult<Deletion>;

    async fn get_resource(&self, resource: &ResourceRef) -> ClusterResult<Lookup>;

    /// Objects of `kind` in `namespace` (every namespace when `None`) matching a label selector.
    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> ClusterResult<Vec<ResourceRef>>;

    /// Block server-side until `condition` holds or `timeout` elapses.
    async fn wait_for_condition(
        &self,
        resource: &ResourceRef,
        condition: &str,
        timeout: Duration,
    ) -> ClusterResult<bool>;

    /// Trigger a rolling restart so the workload refreshes its caches.
    async fn restart_workload(&self, resource: &ResourceRef) -> ClusterResult<()>;

    /// Name of the first pod matching `selector`, if any.
    async fn find_pod(&self, namespace: &str, selector: &str) -> ClusterResult<Option<String>>;

    /// Run a command inside a pod; the caller interprets the exit code.
    async fn exec(&self, namespace: &str, pod: &str, command: &[String])
        -> ClusterResult<StepResult>;
}

/// The reconciling config-sync controller's application objects.
#[async_trait]
pub trait DeclarativeConfigController: Send + Sync {
    /// Register the application described by the file at `descriptor`.
    async fn apply(&self, descriptor: &Path) -> ClusterResult<()>;

    /// Ask the controller to reconcile now instead of at its next poll.
    async fn force_refresh(&self, name: &str) -> ClusterResult<()>;

    async fn delete(&self, name: &str, options: DeleteOptions) -> ClusterResult<Deletion>;

    /// Set a dotted spec field; returns false when the application does not exist.
    async fn patch(&self, name: &str, field: &str, value: serde_json::Value) -> ClusterResult<bool>;

    async fn get(&self, name: &str) -> ClusterResult<Lookup>;
}

/// Dashboard-as-code resource for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardDescriptor {
    pub service: String,
    /// Address of the resource within the dashboard tool.
    pub resource: String,
    /// Repository-relative path of the source file.
    pub source_file: PathBuf,
}

impl DashboardDescriptor {
    pub fn for_service(descriptor: &ServiceDescriptor) -> Self {
        Self {
            service: descriptor.name.clone(),
            resource: descriptor.dashboard_resource(),
            source_file: descriptor.artifact_layout().dashboard_file,
        }
    }
}

#[async_trait]
pub trait DashboardProvisioner: Send + Sync {
    async fn apply(&self, dashboard: &DashboardDescriptor) -> Result<(), ExecutionError>;

    async fn destroy(&self, dashboard: &DashboardDescriptor) -> Result<(), ExecutionError>;
}
