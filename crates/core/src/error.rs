use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid service name '{0}': must be a lowercase DNS label of at most 63 characters")]
    InvalidName(String),

    #[error("Invalid coin symbol '{0}': must be 2-10 ASCII alphanumeric characters")]
    InvalidCoin(String),

    #[error("Unknown service type '{0}' (expected collector or ingestor)")]
    UnknownServiceType(String),
}

/// Failure of an operation run by a [`crate::StepExecutor`].
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("`{operation}` exited with code {exit_code}: {stderr}")]
    Failed {
        operation: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to start `{operation}`: {source}")]
    Spawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutionError {
    pub fn operation(&self) -> &str {
        match self {
            Self::Failed { operation, .. } | Self::Spawn { operation, .. } => operation,
        }
    }

    /// Captured error stream, or the spawn error text.
    pub fn stderr(&self) -> String {
        match self {
            Self::Failed { stderr, .. } => stderr.clone(),
            Self::Spawn { source, .. } => source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
