//! Per-run record of what each step did.

use chrono::{DateTime, Utc};
use idp_core::ResourceRef;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::plan::{FailurePolicy, LifecyclePlan, Step};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed(String),
    /// Nothing to do: the resource was already in the desired state.
    NoOp(String),
    /// A soft failure; the run continued.
    Warned(String),
}

impl StepOutcome {
    pub fn detail(&self) -> &str {
        match self {
            Self::Completed(detail) | Self::NoOp(detail) | Self::Warned(detail) => detail,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warned(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    Provisioned,
    Removed,
    /// Removal finished but these objects never reached `Absent`.
    RemovedWithWarnings { stuck: Vec<ResourceRef> },
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioned => f.write_str("Provisioned"),
            Self::Removed => f.write_str("Removed"),
            Self::RemovedWithWarnings { stuck } => {
                write!(f, "Removed with warnings ({} stuck)", stuck.len())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub service: String,
    pub steps: Vec<StepRecord>,
    pub terminal: Option<TerminalState>,
    /// Operational rows removed during decommission.
    pub removed_records: Option<u64>,
    #[serde(skip)]
    plan: LifecyclePlan,
}

impl RunReport {
    pub fn new(run_id: Uuid, service: impl Into<String>, plan: LifecyclePlan) -> Self {
        Self {
            run_id,
            service: service.into(),
            steps: Vec::new(),
            terminal: None,
            removed_records: None,
            plan,
        }
    }

    /// Record the result of one step.
    ///
    /// A failure of a fatal step is returned as [`OrchestratorError::StepFailed`];
    /// a failure of a soft step is logged and recorded as a warning.
    pub fn settle(
        &mut self,
        step: Step,
        started_at: DateTime<Utc>,
        result: Result<StepOutcome>,
    ) -> Result<()> {
        let policy = self.plan.policy(step);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if policy == FailurePolicy::Soft => {
                warn!(step = %step, error = %e, "Step failed, continuing");
                StepOutcome::Warned(e.to_string())
            }
            Err(e) => return Err(OrchestratorError::step_failed(step, e)),
        };

        let progress = format!(
            "{}/{}",
            self.plan.position(step).map_or(0, |index| index + 1),
            self.plan.len()
        );
        match &outcome {
            StepOutcome::Completed(detail) => info!(step = %step, %progress, "{}", detail),
            StepOutcome::NoOp(detail) => info!(step = %step, %progress, "No-op: {}", detail),
            StepOutcome::Warned(detail) => warn!(step = %step, %progress, "{}", detail),
        }

        self.steps.push(StepRecord {
            step,
            outcome,
            started_at,
            finished_at: Utc::now(),
        });
        Ok(())
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .rev()
            .find(|record| record.step == step)
            .map(|record| &record.outcome)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|record| record.outcome.is_warning())
    }

    pub fn finish(&mut self, terminal: TerminalState) {
        info!(service = %self.service, terminal = %terminal, "Lifecycle finished");
        self.terminal = Some(terminal);
    }
}
