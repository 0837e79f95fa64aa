use async_trait::async_trait;
use idp_core::{Operation, StepExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, VcsError};
use crate::traits::{CommitOutcome, VersionControl};

pub struct GitVcs {
    repo_path: PathBuf,
    remote: String,
    branch: String,
    executor: Arc<dyn StepExecutor>,
}

impl GitVcs {
    pub fn new(repo_path: PathBuf, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            repo_path,
            remote: "origin".to_string(),
            branch: "main".to_string(),
            executor,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// URL of the configured remote, or `None` when the remote is not set up.
    pub async fn remote_url(&self) -> Option<String> {
        let result = self
            .executor
            .probe(&Self::git(&["remote", "get-url", &self.remote]), &self.repo_path)
            .await;
        if !result.success() {
            debug!(remote = %self.remote, "No remote URL: {}", result.stderr.trim());
            return None;
        }
        let url = result.stdout.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    fn git(args: &[&str]) -> Operation {
        Operation::new("git").args(args.iter().copied())
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        debug!("Running git {:?} in {:?}", args, self.repo_path);
        let result = self.executor.run(&Self::git(args), &self.repo_path).await?;
        Ok(result.stdout)
    }
}

#[async_trait]
impl VersionControl for GitVcs {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn is_initialized(&self) -> Result<bool> {
        let git_dir = self.repo_path.join(".git");
        Ok(git_dir.exists())
    }

    async fn stage_all(&self) -> Result<()> {
        if !self.is_initialized().await? {
            return Err(VcsError::NotInitialized(self.repo_path.display().to_string()));
        }

        self.run_git(&["add", "-A"]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<CommitOutcome> {
        // Exit code 0 means the index matches HEAD.
        let staged = self
            .executor
            .probe(&Self::git(&["diff", "--cached", "--quiet"]), &self.repo_path)
            .await;

        match staged.exit_code {
            0 => {
                info!("Nothing to commit for: {}", message);
                return Ok(CommitOutcome::NothingToCommit);
            }
            1 => {}
            code => {
                return Err(VcsError::CommandFailed(format!(
                    "git diff --cached exited with {}: {}",
                    code,
                    staged.stderr.trim()
                )))
            }
        }

        self.run_git(&["commit", "-m", message]).await?;

        let sha = self.run_git(&["rev-parse", "HEAD"]).await?;
        let sha = sha.trim().to_string();
        if sha.is_empty() {
            return Err(VcsError::Parse("git rev-parse HEAD returned nothing".to_string()));
        }

        info!(sha = %sha, "Committed: {}", message);
        Ok(CommitOutcome::Committed { sha })
    }

    async fn push(&self) -> Result<()> {
        self.run_git(&["push", &self.remote, &self.branch]).await?;
        info!(remote = %self.remote, branch = %self.branch, "Pushed");
        Ok(())
    }
}
