//! Entry point composing descriptor, lease, and pipelines for one command.

use idp_core::{ServiceDescriptor, ServiceType, StepExecutor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::adapters::Collaborators;
use crate::config::IdpConfig;
use crate::error::Result;
use crate::lease::ServiceLease;
use crate::pipeline::{Decommission, PipelineContext, Provision};
use crate::plan::LifecyclePlan;
use crate::render::TemplateSet;
use crate::report::RunReport;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CreateService,
    RemoveService,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateService => "create-service",
            Self::RemoveService => "rm-service",
        }
    }

    fn plan(&self) -> LifecyclePlan {
        match self {
            Self::CreateService => LifecyclePlan::provision(),
            Self::RemoveService => LifecyclePlan::decommission(),
        }
    }
}

pub struct LifecycleOrchestrator {
    repo_root: PathBuf,
    config: IdpConfig,
    collaborators: Collaborators,
    templates: TemplateSet,
}

impl LifecycleOrchestrator {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        config: IdpConfig,
        collaborators: Collaborators,
        templates: TemplateSet,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            config,
            collaborators,
            templates,
        }
    }

    /// Load configuration and templates from the repository and wire the real tools.
    pub async fn for_repository(repo_root: &Path, executor: Arc<dyn StepExecutor>) -> Result<Self> {
        let config = IdpConfig::load(repo_root).await?;
        let templates = TemplateSet::from_config(&config, repo_root).await?;
        let collaborators = Collaborators::from_config(&config, repo_root, executor);
        Ok(Self::new(repo_root, config, collaborators, templates))
    }

    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    pub fn descriptor(
        &self,
        name: &str,
        coin: &str,
        service_type: ServiceType,
    ) -> Result<ServiceDescriptor> {
        Ok(ServiceDescriptor::new(
            name,
            coin,
            service_type,
            &self.config.cluster.namespace_layout(),
        )?)
    }

    pub async fn create_service(
        &self,
        name: &str,
        coin: &str,
        service_type: ServiceType,
    ) -> Result<RunReport> {
        let descriptor = self.descriptor(name, coin, service_type)?;
        self.execute(Command::CreateService, &descriptor).await
    }

    pub async fn remove_service(
        &self,
        name: &str,
        coin: &str,
        service_type: ServiceType,
    ) -> Result<RunReport> {
        let descriptor = self.descriptor(name, coin, service_type)?;
        self.execute(Command::RemoveService, &descriptor).await
    }

    async fn execute(&self, command: Command, descriptor: &ServiceDescriptor) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "lifecycle",
            run_id = %run_id,
            service = %descriptor.name,
            command = command.as_str()
        );

        async {
            let _lease = ServiceLease::acquire(
                &self.repo_root,
                &descriptor.name,
                run_id,
                self.config.lease.stale_after(),
            )?;
            info!(
                namespace = %descriptor.namespace,
                image = %descriptor.image_tag,
                "Starting {}",
                command.as_str()
            );

            let ctx = PipelineContext::new(
                descriptor,
                &self.config,
                &self.collaborators,
                &self.templates,
                Workspace::new(&self.repo_root),
            );
            let mut report = RunReport::new(run_id, &descriptor.name, command.plan());

            let result = match command {
                Command::CreateService => Provision::new(ctx).run(&mut report).await,
                Command::RemoveService => Decommission::new(ctx).run(&mut report).await,
            };

            match result {
                Ok(()) => Ok(report),
                Err(e) => {
                    error!(error = %e, "{} aborted", command.as_str());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
