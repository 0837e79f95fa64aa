//! Command-line backed implementations of the collaborator traits.

mod argocd;
mod builder;
mod dashboards;
mod datastore;
mod kubectl;

pub use argocd::ArgoCdController;
pub use builder::DockerKindBuilder;
pub use dashboards::TerraformDashboards;
pub use datastore::IngestorDataStore;
pub use kubectl::{Kubectl, KubectlCluster};

use idp_core::{OperationalDataStore, StepExecutor};
use std::path::Path;
use std::sync::Arc;
use vcs::{GitVcs, VersionControl};

use crate::clock::{Clock, TokioClock};
use crate::collaborators::{
    ClusterClient, ContainerBuilder, DashboardProvisioner, DeclarativeConfigController,
};
use crate::config::IdpConfig;

/// Every external system a lifecycle run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub builder: Arc<dyn ContainerBuilder>,
    pub cluster: Arc<dyn ClusterClient>,
    pub controller: Arc<dyn DeclarativeConfigController>,
    pub vcs: Arc<dyn VersionControl>,
    pub dashboards: Arc<dyn DashboardProvisioner>,
    pub datastore: Arc<dyn OperationalDataStore>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Wire the real tools for the repository at `repo_root`.
    pub fn from_config(
        config: &IdpConfig,
        repo_root: &Path,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        let kubectl = Kubectl::new(executor.clone(), repo_root)
            .with_context(config.cluster.kube_context.clone());
        let cluster: Arc<dyn ClusterClient> = Arc::new(KubectlCluster::new(kubectl.clone()));

        Self {
            builder: Arc::new(DockerKindBuilder::new(
                executor.clone(),
                repo_root,
                &config.cluster.kind_cluster,
            )),
            controller: Arc::new(ArgoCdController::new(
                kubectl,
                &config.gitops.controller_namespace,
            )),
            vcs: Arc::new(
                GitVcs::new(repo_root.to_path_buf(), executor.clone())
                    .with_remote(&config.repository.remote)
                    .with_branch(&config.repository.branch),
            ),
            dashboards: Arc::new(TerraformDashboards::new(
                executor,
                repo_root.join(&config.dashboards.terraform_dir),
            )),
            datastore: Arc::new(IngestorDataStore::new(
                cluster.clone(),
                config.datastore.clone(),
            )),
            cluster,
            clock: Arc::new(TokioClock),
        }
    }
}
