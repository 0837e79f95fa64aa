pub mod datastore;
pub mod domain;
pub mod error;
pub mod exec;

pub use datastore::{DataStoreError, OperationalDataStore};
pub use domain::descriptor::{
    ArtifactLayout, NamespaceLayout, ServiceDescriptor, ServiceType, DEFAULT_SHARED_NAMESPACE,
};
pub use domain::resource::{ResourceKind, ResourceRef, ResourceState};
pub use error::{CoreError, ExecutionError, Result};
pub use exec::{ExecMode, Operation, ProcessExecutor, StepExecutor, StepResult};
