pub mod adapters;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod lease;
pub mod lifecycle;
pub mod pipeline;
pub mod plan;
pub mod render;
pub mod report;
pub mod verify;
pub mod workspace;

pub use adapters::Collaborators;
pub use clock::{Clock, TokioClock};
pub use collaborators::{
    Applied, ClusterClient, ContainerBuilder, DashboardDescriptor, DashboardProvisioner,
    DeclarativeConfigController, DeleteOptions, Deletion, Lookup, ObservedResource,
};
pub use config::IdpConfig;
pub use error::{ClusterError, ClusterResult, OrchestratorError, Result};
pub use lease::{LeaseHolder, ServiceLease};
pub use lifecycle::{Command, LifecycleOrchestrator};
pub use plan::{FailurePolicy, LifecyclePlan, Step};
pub use render::{render, ArtifactKind, RenderedArtifacts, TemplateSet};
pub use report::{RunReport, StepOutcome, StepRecord, TerminalState};
pub use verify::{PollPolicy, StateVerifier};
pub use workspace::Workspace;
