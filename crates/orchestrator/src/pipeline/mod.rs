//! The create-service and rm-service step pipelines.

mod decommission;
mod provision;

pub use decommission::Decommission;
pub use provision::Provision;

use idp_core::ServiceDescriptor;
use tracing::info;
use vcs::CommitOutcome;

use crate::adapters::Collaborators;
use crate::config::IdpConfig;
use crate::error::Result;
use crate::render::TemplateSet;
use crate::report::StepOutcome;
use crate::verify::StateVerifier;
use crate::workspace::Workspace;

/// Everything one pipeline run reads; owned by the caller for the run's duration.
pub struct PipelineContext<'a> {
    pub descriptor: &'a ServiceDescriptor,
    pub config: &'a IdpConfig,
    pub collaborators: &'a Collaborators,
    pub templates: &'a TemplateSet,
    pub workspace: Workspace,
    pub verifier: StateVerifier,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        descriptor: &'a ServiceDescriptor,
        config: &'a IdpConfig,
        collaborators: &'a Collaborators,
        templates: &'a TemplateSet,
        workspace: Workspace,
    ) -> Self {
        let verifier = StateVerifier::new(
            collaborators.cluster.clone(),
            collaborators.clock.clone(),
        );
        Self {
            descriptor,
            config,
            collaborators,
            templates,
            workspace,
            verifier,
        }
    }

    /// Stage everything, commit, and push. Push runs even when there was nothing
    /// to commit.
    pub(crate) async fn commit_and_push(&self, message: &str) -> Result<StepOutcome> {
        let vcs = &self.collaborators.vcs;
        vcs.stage_all().await?;
        let outcome = vcs.commit(message).await?;
        vcs.push().await?;

        Ok(match outcome {
            CommitOutcome::Committed { sha } => {
                info!(sha = %sha, "Pushed: {}", message);
                StepOutcome::Completed(format!("committed {} and pushed", short_sha(&sha)))
            }
            CommitOutcome::NothingToCommit => {
                StepOutcome::NoOp("nothing to commit; branch pushed".to_string())
            }
        })
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
