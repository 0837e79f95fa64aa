use chrono::Utc;
use idp_core::{ResourceKind, ResourceRef, ResourceState};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};

use super::PipelineContext;
use crate::collaborators::{DashboardDescriptor, DeleteOptions, Deletion, Lookup};
use crate::error::Result;
use crate::plan::{LifecyclePlan, Step};
use crate::report::{RunReport, StepOutcome, TerminalState};

const AUTOMATED_SYNC_FIELD: &str = "spec.syncPolicy.automated";

/// The rm-service pipeline.
///
/// Declarative sources are removed and pushed before any live object is
/// deleted; otherwise the config-sync controller would recreate what is being
/// torn down.
pub struct Decommission<'a> {
    ctx: PipelineContext<'a>,
    stuck: Vec<ResourceRef>,
    removed_records: Option<u64>,
    namespace_deleted: bool,
}

impl<'a> Decommission<'a> {
    pub fn new(ctx: PipelineContext<'a>) -> Self {
        Self {
            ctx,
            stuck: Vec::new(),
            removed_records: None,
            namespace_deleted: false,
        }
    }

    pub fn plan() -> LifecyclePlan {
        LifecyclePlan::decommission()
    }

    pub async fn run(mut self, report: &mut RunReport) -> Result<()> {
        for planned in Self::plan().steps() {
            let started_at = Utc::now();
            info!(step = %planned.step, "{}", planned.step.describe());
            let result = self.execute(planned.step).await;
            report.settle(planned.step, started_at, result)?;
        }

        report.removed_records = self.removed_records;
        let terminal = if self.stuck.is_empty() {
            TerminalState::Removed
        } else {
            TerminalState::RemovedWithWarnings { stuck: self.stuck }
        };
        report.finish(terminal);
        Ok(())
    }

    async fn execute(&mut self, step: Step) -> Result<StepOutcome> {
        let descriptor = self.ctx.descriptor;
        match step {
            Step::SuspendSync => self.suspend_sync().await,
            Step::RemoveDeclarativeArtifacts => self.remove_declarative_artifacts().await,
            Step::CommitAndPush => {
                let message = format!("feat(idp): remove {} service", descriptor.name);
                self.ctx.commit_and_push(&message).await
            }
            Step::DeleteDeclarativeApplication => self.delete_declarative_application().await,
            Step::DeleteNamespaceOrResources => self.delete_namespace_or_resources().await,
            Step::WaitForNamespaceGone => self.wait_for_namespace_gone().await,
            Step::DeleteStorage => self.delete_storage().await,
            Step::CleanupDataStore => self.cleanup_datastore().await,
            Step::NotifyDependents => self.notify_dependents().await,
            Step::DestroyObservability => self.destroy_observability().await,
            Step::FinalCommitAndPush => {
                let message = format!("feat(idp): remove {} dashboard", descriptor.name);
                self.ctx.commit_and_push(&message).await
            }
            Step::VerifyAbsence => self.verify_absence().await,
            other => unreachable!("{other} is not a decommission step"),
        }
    }

    fn deployment(&self) -> ResourceRef {
        ResourceRef::deployment(&self.ctx.descriptor.name, &self.ctx.descriptor.namespace)
    }

    async fn suspend_sync(&self) -> Result<StepOutcome> {
        let application = self.ctx.descriptor.application_name();
        let patched = self
            .ctx
            .collaborators
            .controller
            .patch(application, AUTOMATED_SYNC_FIELD, Value::Null)
            .await?;

        Ok(if patched {
            StepOutcome::Completed(format!("disabled auto-sync for {}", application))
        } else {
            StepOutcome::NoOp(format!("application {} already absent", application))
        })
    }

    async fn remove_declarative_artifacts(&self) -> Result<StepOutcome> {
        let layout = self.ctx.descriptor.artifact_layout();
        let mut removed = Vec::new();
        for path in [
            &layout.application_file,
            &layout.manifests_dir,
            &layout.scaffold_dir,
        ] {
            if self.ctx.workspace.remove(path).await? {
                removed.push(path.display().to_string());
            }
        }

        Ok(if removed.is_empty() {
            StepOutcome::NoOp("declarative artifacts already removed".to_string())
        } else {
            StepOutcome::Completed(format!("removed {}", removed.join(", ")))
        })
    }

    async fn delete_declarative_application(&self) -> Result<StepOutcome> {
        let application = self.ctx.descriptor.application_name();
        match self
            .ctx
            .collaborators
            .controller
            .delete(application, DeleteOptions::background())
            .await?
        {
            Deletion::Requested => Ok(StepOutcome::Completed(format!(
                "deletion of application {} requested",
                application
            ))),
            Deletion::AlreadyAbsent => Ok(StepOutcome::NoOp(format!(
                "application {} already absent",
                application
            ))),
        }
    }

    /// Other deployments living in this service's namespace.
    async fn sibling_workloads(&self) -> Result<Vec<String>> {
        let descriptor = self.ctx.descriptor;
        let deployments = self
            .ctx
            .collaborators
            .cluster
            .list_resources(
                ResourceKind::Deployment,
                Some(descriptor.namespace.as_str()),
                None,
            )
            .await?;
        Ok(deployments
            .into_iter()
            .filter(|deployment| deployment.name != descriptor.name)
            .map(|deployment| deployment.name)
            .collect())
    }

    async fn delete_namespace_or_resources(&mut self) -> Result<StepOutcome> {
        let descriptor = self.ctx.descriptor;
        let cluster = &self.ctx.collaborators.cluster;

        if descriptor.owns_namespace {
            let siblings = self.sibling_workloads().await?;
            if siblings.is_empty() {
                return match cluster.delete_namespace(&descriptor.namespace).await? {
                    Deletion::Requested => {
                        self.namespace_deleted = true;
                        Ok(StepOutcome::Completed(format!(
                            "deletion of namespace {} requested",
                            descriptor.namespace
                        )))
                    }
                    Deletion::AlreadyAbsent => Ok(StepOutcome::NoOp(format!(
                        "namespace {} already absent",
                        descriptor.namespace
                    ))),
                };
            }
            info!(
                namespace = %descriptor.namespace,
                siblings = %siblings.join(", "),
                "Namespace still hosts other services, deleting by name"
            );
        }

        let ns = &descriptor.namespace;
        let owned = [
            ResourceRef::deployment(&descriptor.name, ns),
            ResourceRef::namespaced(ResourceKind::Service, &descriptor.name, ns),
            ResourceRef::namespaced(ResourceKind::ConfigMap, descriptor.config_map_name(), ns),
            ResourceRef::namespaced(
                ResourceKind::PersistentVolumeClaim,
                descriptor.claim_name(),
                ns,
            ),
        ];

        let mut deleted = Vec::new();
        for resource in &owned {
            if cluster
                .delete_resource(resource, DeleteOptions::background())
                .await?
                == Deletion::Requested
            {
                deleted.push(format!("{}/{}", resource.kind.as_str(), resource.name));
            }
        }

        Ok(if deleted.is_empty() {
            StepOutcome::NoOp(format!("no objects of {} left in namespace {}", descriptor.name, ns))
        } else {
            StepOutcome::Completed(format!("deleted {} in namespace {}", deleted.join(", "), ns))
        })
    }

    async fn wait_for_namespace_gone(&mut self) -> Result<StepOutcome> {
        let descriptor = self.ctx.descriptor;
        // A namespace that stays is not waited on; wait for the workload instead.
        let target = if self.namespace_deleted {
            ResourceRef::namespace(&descriptor.namespace)
        } else {
            self.deployment()
        };

        let policy = self.ctx.config.verify.namespace_policy();
        match self
            .ctx
            .verifier
            .wait_for(&target, ResourceState::Absent, policy)
            .await
        {
            ResourceState::Absent => Ok(StepOutcome::Completed(format!("{} is gone", target))),
            _ => {
                let detail = format!(
                    "{} still present after {}s (finalizers pending?)",
                    target,
                    policy.timeout.as_secs()
                );
                self.stuck.push(target);
                Ok(StepOutcome::Warned(detail))
            }
        }
    }

    /// Claims of other services bound to the same coin's volume.
    async fn sibling_claims(&self) -> Result<Vec<ResourceRef>> {
        let descriptor = self.ctx.descriptor;
        let selector = format!("coin={}", descriptor.coin_lower());
        let claims = self
            .ctx
            .collaborators
            .cluster
            .list_resources(ResourceKind::PersistentVolumeClaim, None, Some(selector.as_str()))
            .await?;
        let own = ResourceRef::namespaced(
            ResourceKind::PersistentVolumeClaim,
            descriptor.claim_name(),
            &descriptor.namespace,
        );
        Ok(claims.into_iter().filter(|claim| *claim != own).collect())
    }

    async fn delete_storage(&mut self) -> Result<StepOutcome> {
        let volume = ResourceRef::persistent_volume(self.ctx.descriptor.volume_name());

        let siblings = self.sibling_claims().await?;
        if !siblings.is_empty() {
            let names: Vec<String> = siblings.iter().map(ToString::to_string).collect();
            return Ok(StepOutcome::NoOp(format!(
                "{} kept, still claimed by {}",
                volume,
                names.join(", ")
            )));
        }

        let deletion = self
            .ctx
            .collaborators
            .cluster
            .delete_resource(&volume, DeleteOptions::forced())
            .await?;

        let policy = self.ctx.config.verify.storage_policy();
        let state = self
            .ctx
            .verifier
            .wait_for(&volume, ResourceState::Absent, policy)
            .await;

        match (deletion, state) {
            (Deletion::AlreadyAbsent, ResourceState::Absent) => {
                Ok(StepOutcome::NoOp(format!("{} already absent", volume)))
            }
            (_, ResourceState::Absent) => Ok(StepOutcome::Completed(format!("deleted {}", volume))),
            _ => {
                let detail = format!("{} still present after {}s", volume, policy.timeout.as_secs());
                self.stuck.push(volume);
                Ok(StepOutcome::Warned(detail))
            }
        }
    }

    async fn cleanup_datastore(&mut self) -> Result<StepOutcome> {
        let symbol = &self.ctx.descriptor.coin_symbol;
        let removed = self
            .ctx
            .collaborators
            .datastore
            .delete_records(symbol)
            .await?;
        self.removed_records = Some(removed);

        Ok(if removed == 0 {
            StepOutcome::NoOp(format!("no {} records to remove", symbol))
        } else {
            StepOutcome::Completed(format!("removed {} {} records", removed, symbol))
        })
    }

    async fn notify_dependents(&self) -> Result<StepOutcome> {
        let dependents = &self.ctx.config.dependents;
        if dependents.is_empty() {
            return Ok(StepOutcome::NoOp("no dependents configured".to_string()));
        }

        let mut restarted = Vec::new();
        let mut failed = Vec::new();
        for dependent in dependents {
            let resource = dependent.resource();
            match self.ctx.collaborators.cluster.restart_workload(&resource).await {
                Ok(()) => restarted.push(resource.name),
                Err(e) => {
                    warn!(dependent = %resource, error = %e, "Dependent restart failed");
                    failed.push(resource.name);
                }
            }
        }

        Ok(if failed.is_empty() {
            StepOutcome::Completed(format!("restarted {}", restarted.join(", ")))
        } else {
            StepOutcome::Warned(format!("could not restart {}", failed.join(", ")))
        })
    }

    async fn destroy_observability(&self) -> Result<StepOutcome> {
        let descriptor = self.ctx.descriptor;
        let dashboard = DashboardDescriptor::for_service(descriptor);
        let layout = descriptor.artifact_layout();

        let destroyed = self.ctx.collaborators.dashboards.destroy(&dashboard).await;

        let mut removed_files: Vec<PathBuf> = Vec::new();
        for path in [&layout.dashboard_file, &layout.legacy_dashboard_file] {
            if self.ctx.workspace.remove(path).await? {
                removed_files.push(path.clone());
            }
        }

        Ok(match destroyed {
            Ok(()) => StepOutcome::Completed(format!(
                "destroyed {}; removed {} source file(s)",
                dashboard.resource,
                removed_files.len()
            )),
            Err(e) => StepOutcome::Warned(format!(
                "could not destroy {}: {}; removed {} source file(s)",
                dashboard.resource,
                e,
                removed_files.len()
            )),
        })
    }

    /// Re-check the objects a reconcile loop could have brought back.
    async fn verify_absence(&mut self) -> Result<StepOutcome> {
        let application = self.ctx.descriptor.application_name();
        let deployment = self.deployment();
        let controller = &self.ctx.collaborators.controller;
        let cluster = &self.ctx.collaborators.cluster;
        let mut reappeared = Vec::new();

        if let Lookup::Found(_) = controller.get(application).await? {
            warn!(application = %application, "Application reappeared, force-deleting");
            controller.delete(application, DeleteOptions::forced()).await?;
            reappeared.push(ResourceRef::namespaced(
                ResourceKind::Application,
                application,
                &self.ctx.config.gitops.controller_namespace,
            ));
        }

        if let Lookup::Found(_) = cluster.get_resource(&deployment).await? {
            warn!(deployment = %deployment, "Deployment reappeared, force-deleting");
            cluster
                .delete_resource(&deployment, DeleteOptions::forced())
                .await?;
            reappeared.push(deployment);
        }

        if reappeared.is_empty() {
            return Ok(StepOutcome::Completed("no reappeared resources".to_string()));
        }

        let policy = self.ctx.config.verify.storage_policy();
        let mut still_present = Vec::new();
        for resource in &reappeared {
            let state = self
                .ctx
                .verifier
                .wait_for(resource, ResourceState::Absent, policy)
                .await;
            if state != ResourceState::Absent {
                still_present.push(resource.clone());
            }
        }

        let names: Vec<String> = reappeared.iter().map(ToString::to_string).collect();
        if still_present.is_empty() {
            Ok(StepOutcome::Completed(format!(
                "force-deleted reappeared {}",
                names.join(", ")
            )))
        } else {
            let detail = format!(
                "{} reappeared and could not be removed",
                still_present
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            self.stuck.extend(still_present);
            Ok(StepOutcome::Warned(detail))
        }
    }
}
