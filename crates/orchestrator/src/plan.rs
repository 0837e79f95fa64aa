//! Ordered step plans for the two lifecycle commands.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    // create-service
    GenerateCode,
    BuildImage,
    ImportImage,
    EnsureNamespace,
    EnsureStorage,
    GenerateManifests,
    PublishDeclarativeConfig,
    Synchronize,
    CommitAndPush,
    VerifyReady,
    ProvisionObservability,
    // rm-service
    SuspendSync,
    RemoveDeclarativeArtifacts,
    DeleteDeclarativeApplication,
    DeleteNamespaceOrResources,
    WaitForNamespaceGone,
    DeleteStorage,
    CleanupDataStore,
    NotifyDependents,
    DestroyObservability,
    FinalCommitAndPush,
    VerifyAbsence,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateCode => "generate_code",
            Self::BuildImage => "build_image",
            Self::ImportImage => "import_image",
            Self::EnsureNamespace => "ensure_namespace",
            Self::EnsureStorage => "ensure_storage",
            Self::GenerateManifests => "generate_manifests",
            Self::PublishDeclarativeConfig => "publish_declarative_config",
            Self::Synchronize => "synchronize",
            Self::CommitAndPush => "commit_and_push",
            Self::VerifyReady => "verify_ready",
            Self::ProvisionObservability => "provision_observability",
            Self::SuspendSync => "suspend_sync",
            Self::RemoveDeclarativeArtifacts => "remove_declarative_artifacts",
            Self::DeleteDeclarativeApplication => "delete_declarative_application",
            Self::DeleteNamespaceOrResources => "delete_namespace_or_resources",
            Self::WaitForNamespaceGone => "wait_for_namespace_gone",
            Self::DeleteStorage => "delete_storage",
            Self::CleanupDataStore => "cleanup_datastore",
            Self::NotifyDependents => "notify_dependents",
            Self::DestroyObservability => "destroy_observability",
            Self::FinalCommitAndPush => "final_commit_and_push",
            Self::VerifyAbsence => "verify_absence",
        }
    }

    /// Human-readable label for progress output.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::GenerateCode => "Generate service scaffold",
            Self::BuildImage => "Build container image",
            Self::ImportImage => "Import image into cluster",
            Self::EnsureNamespace => "Ensure namespace",
            Self::EnsureStorage => "Ensure persistent storage",
            Self::GenerateManifests => "Generate manifests",
            Self::PublishDeclarativeConfig => "Publish application descriptor",
            Self::Synchronize => "Synchronize application",
            Self::CommitAndPush => "Commit and push",
            Self::VerifyReady => "Verify workload ready",
            Self::ProvisionObservability => "Provision dashboard",
            Self::SuspendSync => "Suspend auto-sync",
            Self::RemoveDeclarativeArtifacts => "Remove declarative artifacts",
            Self::DeleteDeclarativeApplication => "Delete application object",
            Self::DeleteNamespaceOrResources => "Delete namespace or resources",
            Self::WaitForNamespaceGone => "Wait for namespace removal",
            Self::DeleteStorage => "Delete persistent storage",
            Self::CleanupDataStore => "Clean up operational records",
            Self::NotifyDependents => "Refresh dependent services",
            Self::DestroyObservability => "Destroy dashboard",
            Self::FinalCommitAndPush => "Final commit and push",
            Self::VerifyAbsence => "Verify absence",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step failure does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the pipeline and report the step.
    Fatal,
    /// Log a warning and continue.
    Soft,
}

/// How re-running a step is made safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    /// Not idempotent on its own; guarded by the named precondition check.
    Guarded(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    pub step: Step,
    pub policy: FailurePolicy,
    pub idempotency: Idempotency,
}

impl PlannedStep {
    const fn new(step: Step, policy: FailurePolicy, idempotency: Idempotency) -> Self {
        Self {
            step,
            policy,
            idempotency,
        }
    }
}

use FailurePolicy::{Fatal, Soft};
use Idempotency::{Guarded, Idempotent};

const PROVISION: &[PlannedStep] = &[
    PlannedStep::new(Step::GenerateCode, Fatal, Idempotent),
    PlannedStep::new(Step::BuildImage, Fatal, Idempotent),
    PlannedStep::new(Step::ImportImage, Fatal, Idempotent),
    PlannedStep::new(Step::EnsureNamespace, Fatal, Guarded("namespace absent")),
    PlannedStep::new(Step::EnsureStorage, Fatal, Guarded("volume absent")),
    PlannedStep::new(Step::GenerateManifests, Fatal, Idempotent),
    PlannedStep::new(Step::PublishDeclarativeConfig, Fatal, Idempotent),
    PlannedStep::new(Step::Synchronize, Fatal, Idempotent),
    PlannedStep::new(Step::CommitAndPush, Fatal, Guarded("staged changes present")),
    PlannedStep::new(Step::VerifyReady, Soft, Idempotent),
    PlannedStep::new(Step::ProvisionObservability, Soft, Idempotent),
];

// The removal commit is pushed before the live application is deleted so the
// controller has nothing left to recreate it from.
const DECOMMISSION: &[PlannedStep] = &[
    PlannedStep::new(Step::SuspendSync, Soft, Guarded("application present")),
    PlannedStep::new(Step::RemoveDeclarativeArtifacts, Fatal, Idempotent),
    PlannedStep::new(Step::CommitAndPush, Fatal, Guarded("staged changes present")),
    PlannedStep::new(Step::DeleteDeclarativeApplication, Soft, Guarded("application present")),
    PlannedStep::new(Step::DeleteNamespaceOrResources, Soft, Guarded("resource present")),
    PlannedStep::new(Step::WaitForNamespaceGone, Soft, Idempotent),
    PlannedStep::new(Step::DeleteStorage, Soft, Guarded("volume present")),
    PlannedStep::new(Step::CleanupDataStore, Soft, Idempotent),
    PlannedStep::new(Step::NotifyDependents, Soft, Idempotent),
    PlannedStep::new(Step::DestroyObservability, Soft, Idempotent),
    PlannedStep::new(Step::FinalCommitAndPush, Fatal, Guarded("staged changes present")),
    PlannedStep::new(Step::VerifyAbsence, Soft, Guarded("resource reappeared")),
];

/// A fixed, strictly sequential step order.
#[derive(Debug, Clone, Copy)]
pub struct LifecyclePlan {
    steps: &'static [PlannedStep],
}

impl LifecyclePlan {
    pub fn provision() -> Self {
        Self { steps: PROVISION }
    }

    pub fn decommission() -> Self {
        Self {
            steps: DECOMMISSION,
        }
    }

    pub fn steps(&self) -> &'static [PlannedStep] {
        self.steps
    }

    pub fn get(&self, step: Step) -> Option<&'static PlannedStep> {
        self.steps.iter().find(|planned| planned.step == step)
    }

    pub fn position(&self, step: Step) -> Option<usize> {
        self.steps.iter().position(|planned| planned.step == step)
    }

    /// Policy of `step`; steps outside the plan are treated as fatal.
    pub fn policy(&self, step: Step) -> FailurePolicy {
        self.get(step).map(|planned| planned.policy).unwrap_or(Fatal)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
