//! Platform configuration stored in `.idp/config.toml` at the repository root.

use idp_core::{NamespaceLayout, ResourceKind, ResourceRef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::error::{OrchestratorError, Result};
use crate::verify::PollPolicy;

pub const CONFIG_DIR: &str = ".idp";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// Directory whose files override built-in templates of the same name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
    pub repository: RepositoryConfig,
    pub cluster: ClusterConfig,
    pub gitops: GitOpsConfig,
    pub verify: VerifyConfig,
    pub datastore: DataStoreConfig,
    pub dashboards: DashboardConfig,
    pub lease: LeaseConfig,
    /// Read-side workloads restarted after a removal. An explicit empty list disables it.
    pub dependents: Vec<DependentConfig>,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            templates_dir: None,
            repository: RepositoryConfig::default(),
            cluster: ClusterConfig::default(),
            gitops: GitOpsConfig::default(),
            verify: VerifyConfig::default(),
            datastore: DataStoreConfig::default(),
            dashboards: DashboardConfig::default(),
            lease: LeaseConfig::default(),
            dependents: vec![DependentConfig {
                kind: ResourceKind::Deployment,
                name: "crypto-frontend".to_string(),
                namespace: "default".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub remote: String,
    pub branch: String,
    /// Clone URL written into application descriptors.
    pub repo_url: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            repo_url: "https://github.com/example/platform.git".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    #[default]
    Dedicated,
    Shared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Name of the local kind cluster images are loaded into.
    pub kind_cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
    pub layout: LayoutKind,
    pub shared_namespace: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kind_cluster: "idp".to_string(),
            kube_context: None,
            layout: LayoutKind::Dedicated,
            shared_namespace: idp_core::DEFAULT_SHARED_NAMESPACE.to_string(),
        }
    }
}

impl ClusterConfig {
    pub fn namespace_layout(&self) -> NamespaceLayout {
        match self.layout {
            LayoutKind::Dedicated => NamespaceLayout::Dedicated,
            LayoutKind::Shared => NamespaceLayout::Shared(self.shared_namespace.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitOpsConfig {
    pub controller_namespace: String,
    pub target_revision: String,
}

impl Default for GitOpsConfig {
    fn default() -> Self {
        Self {
            controller_namespace: "argocd".to_string(),
            target_revision: "HEAD".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub ready_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub namespace_retries: u32,
    pub storage_retries: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 60,
            poll_interval_secs: 2,
            namespace_retries: 30,
            storage_retries: 10,
        }
    }
}

impl VerifyConfig {
    fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn ready_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.ready_timeout_secs), self.interval())
    }

    pub fn namespace_policy(&self) -> PollPolicy {
        PollPolicy::from_retries(self.namespace_retries, self.interval())
    }

    pub fn storage_policy(&self) -> PollPolicy {
        PollPolicy::from_retries(self.storage_retries, self.interval())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStoreConfig {
    /// Namespace the ingestion worker runs in.
    pub namespace: String,
    /// Label selector locating the ingestion worker pod.
    pub selector: String,
    /// Path of the SQLite file inside the worker pod.
    pub database_path: String,
    /// Interpreter available in the worker image, used to run the scoped delete.
    pub python: String,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            selector: "app=crypto-ingestor".to_string(),
            database_path: "/data/crypto.db".to_string(),
            python: "python3".to_string(),
        }
    }
}

/// A read-side workload restarted after a service is removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentConfig {
    #[serde(default = "default_dependent_kind")]
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default = "default_dependent_namespace")]
    pub namespace: String,
}

fn default_dependent_kind() -> ResourceKind {
    ResourceKind::Deployment
}

fn default_dependent_namespace() -> String {
    "default".to_string()
}

impl DependentConfig {
    pub fn resource(&self) -> ResourceRef {
        ResourceRef::namespaced(self.kind, &self.name, &self.namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub terraform_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::from("terraform/grafana"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Age after which a service lock is considered abandoned.
    pub stale_after_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 3600,
        }
    }
}

impl LeaseConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl IdpConfig {
    pub fn path(repo_root: &Path) -> PathBuf {
        repo_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Read config from the repository; a missing file yields defaults.
    pub async fn load(repo_root: &Path) -> Result<Self> {
        let config_path = Self::path(repo_root);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).await?;
        let config = toml::from_str(&content).map_err(|e| {
            OrchestratorError::Config(format!("{}: {}", config_path.display(), e))
        })?;
        debug!(path = %config_path.display(), "Config loaded successfully");
        Ok(config)
    }

    pub async fn write(&self, repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(CONFIG_DIR);
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        fs::write(Self::path(repo_root), content).await?;
        Ok(())
    }
}
