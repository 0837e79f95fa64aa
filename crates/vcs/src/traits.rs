use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed { sha: String },
    /// The working tree had no staged changes; nothing was recorded.
    NothingToCommit,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    pub fn sha(&self) -> Option<&str> {
        match self {
            CommitOutcome::Committed { sha } => Some(sha),
            CommitOutcome::NothingToCommit => None,
        }
    }
}

/// Trait for version control operations on the platform repository
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Get the name of the VCS backend
    fn name(&self) -> &'static str;

    /// Check if the repository is initialized with this VCS
    async fn is_initialized(&self) -> Result<bool>;

    /// Stage every change in the working tree, including deletions
    async fn stage_all(&self) -> Result<()>;

    /// Commit staged changes; an empty index is a no-op, not an error
    async fn commit(&self, message: &str) -> Result<CommitOutcome>;

    /// Push the configured branch to the configured remote
    async fn push(&self) -> Result<()>;
}
