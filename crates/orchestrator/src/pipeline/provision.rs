use chrono::Utc;
use idp_core::{ResourceRef, ResourceState};
use tracing::{info, warn};

use super::PipelineContext;
use crate::collaborators::{Applied, DashboardDescriptor};
use crate::error::Result;
use crate::plan::{LifecyclePlan, Step};
use crate::render::{render, ArtifactKind, RenderedArtifacts};
use crate::report::{RunReport, StepOutcome, TerminalState};

/// The create-service pipeline.
pub struct Provision<'a> {
    ctx: PipelineContext<'a>,
    artifacts: Option<RenderedArtifacts>,
}

impl<'a> Provision<'a> {
    pub fn new(ctx: PipelineContext<'a>) -> Self {
        Self {
            ctx,
            artifacts: None,
        }
    }

    pub fn plan() -> LifecyclePlan {
        LifecyclePlan::provision()
    }

    /// Run every step in order. Returns on the first fatal failure.
    pub async fn run(mut self, report: &mut RunReport) -> Result<()> {
        for planned in Self::plan().steps() {
            let started_at = Utc::now();
            info!(step = %planned.step, "{}", planned.step.describe());
            let result = self.execute(planned.step).await;
            report.settle(planned.step, started_at, result)?;
        }

        report.finish(TerminalState::Provisioned);
        Ok(())
    }

    async fn execute(&mut self, step: Step) -> Result<StepOutcome> {
        match step {
            Step::GenerateCode => self.generate_code().await,
            Step::BuildImage => self.build_image().await,
            Step::ImportImage => self.import_image().await,
            Step::EnsureNamespace => self.ensure_namespace().await,
            Step::EnsureStorage => self.ensure_storage().await,
            Step::GenerateManifests => self.generate_manifests().await,
            Step::PublishDeclarativeConfig => self.publish_declarative_config().await,
            Step::Synchronize => self.synchronize().await,
            Step::CommitAndPush => {
                let message = format!("feat(idp): add {} service", self.ctx.descriptor.name);
                self.ctx.commit_and_push(&message).await
            }
            Step::VerifyReady => self.verify_ready().await,
            Step::ProvisionObservability => self.provision_observability().await,
            other => unreachable!("{other} is not a provisioning step"),
        }
    }

    async fn write(&mut self, kinds: &[ArtifactKind]) -> Result<usize> {
        let artifacts = rendered(&mut self.artifacts, &self.ctx)?;
        let written = self.ctx.workspace.write_artifacts(artifacts, kinds).await?;
        for path in &written {
            info!("Wrote {:?}", path);
        }
        Ok(written.len())
    }

    async fn generate_code(&mut self) -> Result<StepOutcome> {
        let written = self.write(&[ArtifactKind::Scaffold]).await?;
        let layout = self.ctx.descriptor.artifact_layout();
        Ok(StepOutcome::Completed(format!(
            "wrote {} files under {}",
            written,
            layout.scaffold_dir.display()
        )))
    }

    async fn build_image(&self) -> Result<StepOutcome> {
        let descriptor = self.ctx.descriptor;
        let layout = descriptor.artifact_layout();
        self.ctx
            .collaborators
            .builder
            .build(&descriptor.image_tag, &layout.scaffold_dir)
            .await?;
        Ok(StepOutcome::Completed(format!("built {}", descriptor.image_tag)))
    }

    async fn import_image(&self) -> Result<StepOutcome> {
        let image = &self.ctx.descriptor.image_tag;
        self.ctx
            .collaborators
            .builder
            .import_into_cluster(image)
            .await?;
        Ok(StepOutcome::Completed(format!("imported {} into cluster", image)))
    }

    async fn ensure_namespace(&self) -> Result<StepOutcome> {
        let namespace = &self.ctx.descriptor.namespace;
        match self
            .ctx
            .collaborators
            .cluster
            .create_namespace(namespace)
            .await?
        {
            Applied::Created => Ok(StepOutcome::Completed(format!("created namespace {}", namespace))),
            Applied::AlreadyExists => Ok(StepOutcome::NoOp(format!(
                "namespace {} already exists",
                namespace
            ))),
        }
    }

    async fn ensure_storage(&mut self) -> Result<StepOutcome> {
        let volume = self.ctx.descriptor.volume_name();
        let claim = self.ctx.descriptor.claim_name();
        let cluster = &self.ctx.collaborators.cluster;

        let artifacts = rendered(&mut self.artifacts, &self.ctx)?;
        let volume_manifest = artifacts.content_of("persistent-volume.yaml")?;
        let claim_manifest = artifacts.content_of("persistent-volume-claim.yaml")?;

        let existing = cluster
            .get_resource(&ResourceRef::persistent_volume(&volume))
            .await?;
        let created_volume = if existing.exists() {
            info!(volume = %volume, "Persistent volume already present");
            false
        } else {
            cluster.apply_manifest(volume_manifest).await?;
            true
        };

        cluster.apply_manifest(claim_manifest).await?;

        Ok(if created_volume {
            StepOutcome::Completed(format!("created volume {} and claim {}", volume, claim))
        } else {
            StepOutcome::Completed(format!(
                "volume {} already present; applied claim {}",
                volume, claim
            ))
        })
    }

    async fn generate_manifests(&mut self) -> Result<StepOutcome> {
        let written = self
            .write(&[ArtifactKind::Manifest, ArtifactKind::Dashboard])
            .await?;
        let layout = self.ctx.descriptor.artifact_layout();
        Ok(StepOutcome::Completed(format!(
            "wrote {} files under {} and {}",
            written,
            layout.manifests_dir.display(),
            layout.dashboard_file.display()
        )))
    }

    async fn publish_declarative_config(&mut self) -> Result<StepOutcome> {
        self.write(&[ArtifactKind::Application]).await?;
        let layout = self.ctx.descriptor.artifact_layout();
        Ok(StepOutcome::Completed(format!(
            "wrote {}",
            layout.application_file.display()
        )))
    }

    async fn synchronize(&self) -> Result<StepOutcome> {
        let controller = &self.ctx.collaborators.controller;
        let application = self.ctx.descriptor.application_name();
        let layout = self.ctx.descriptor.artifact_layout();

        controller.apply(&layout.application_file).await?;

        match controller.force_refresh(application).await {
            Ok(()) => Ok(StepOutcome::Completed(format!(
                "applied application {} and requested refresh",
                application
            ))),
            Err(e) => Ok(StepOutcome::Warned(format!(
                "applied application {}; refresh failed: {}",
                application, e
            ))),
        }
    }

    async fn verify_ready(&self) -> Result<StepOutcome> {
        let descriptor = self.ctx.descriptor;

        // The controller last saw the repository before the push.
        if let Err(e) = self
            .ctx
            .collaborators
            .controller
            .force_refresh(descriptor.application_name())
            .await
        {
            warn!(error = %e, "Post-push refresh failed");
        }

        let deployment = ResourceRef::deployment(&descriptor.name, &descriptor.namespace);
        let policy = self.ctx.config.verify.ready_policy();
        match self
            .ctx
            .verifier
            .wait_for(&deployment, ResourceState::Active, policy)
            .await
        {
            ResourceState::Active => Ok(StepOutcome::Completed(format!("{} is ready", deployment))),
            state => Ok(StepOutcome::Warned(format!(
                "{} not ready after {}s ({}); it may still be starting",
                deployment,
                policy.timeout.as_secs(),
                state
            ))),
        }
    }

    async fn provision_observability(&self) -> Result<StepOutcome> {
        let dashboard = DashboardDescriptor::for_service(self.ctx.descriptor);
        self.ctx.collaborators.dashboards.apply(&dashboard).await?;
        Ok(StepOutcome::Completed(format!("applied {}", dashboard.resource)))
    }
}

/// Render on first use; later steps reuse the same output.
fn rendered<'s>(
    slot: &'s mut Option<RenderedArtifacts>,
    ctx: &PipelineContext<'_>,
) -> Result<&'s RenderedArtifacts> {
    let artifacts = match slot.take() {
        Some(artifacts) => artifacts,
        None => render(ctx.descriptor, ctx.templates)?,
    };
    Ok(slot.insert(artifacts))
}
