use idp_core::{CoreError, DataStoreError, ExecutionError};
use thiserror::Error;

use crate::plan::Step;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Step {step} failed: {source}")]
    StepFailed {
        step: Step,
        #[source]
        source: Box<OrchestratorError>,
    },

    #[error("Invalid service descriptor: {0}")]
    Descriptor(#[from] CoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Version control error: {0}")]
    Vcs(#[from] vcs::VcsError),

    #[error("Datastore error: {0}")]
    DataStore(#[from] DataStoreError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Service {service} is locked by another invocation ({path}); \
         if no run is active, retry with --force-unlock"
    )]
    Locked { service: String, path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Wrap an error with the step it aborted.
    pub fn step_failed(step: Step, source: OrchestratorError) -> Self {
        Self::StepFailed {
            step,
            source: Box::new(source),
        }
    }

    /// The step that aborted the pipeline, if any.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            Self::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors from cluster-facing collaborators.
///
/// "Not found" is never an error here: lookups and deletes report it as a
/// value ([`crate::collaborators::Lookup::NotFound`],
/// [`crate::collaborators::Deletion::AlreadyAbsent`]).
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("`{operation}` failed: {stderr}")]
    Transport { operation: String, stderr: String },

    #[error("Could not parse output of `{operation}`: {reason}")]
    Parse { operation: String, reason: String },
}

impl From<ExecutionError> for ClusterError {
    fn from(err: ExecutionError) -> Self {
        ClusterError::Transport {
            operation: err.operation().to_string(),
            stderr: err.stderr(),
        }
    }
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
