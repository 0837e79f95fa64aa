use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::{CoreError, Result};

pub const DEFAULT_SHARED_NAMESPACE: &str = "default";

const APPS_DIR: &str = "apps";
const MANIFESTS_DIR: &str = "gitops/manifests";
const APPLICATIONS_DIR: &str = "gitops/apps";
const DASHBOARDS_DIR: &str = "terraform/grafana";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Collector,
    Ingestor,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collector => "collector",
            Self::Ingestor => "ingestor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collector" => Some(Self::Collector),
            "ingestor" => Some(Self::Ingestor),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownServiceType(s.to_string()))
    }
}

/// Where a service's workload objects live in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceLayout {
    /// One namespace per coin (`<coin>-app`), deleted as a whole on removal.
    #[default]
    Dedicated,
    /// All services share a pre-existing namespace; objects are deleted by name.
    Shared(String),
}

/// Identity of a service plus every name derived from it.
///
/// Derivations are pure functions of `name`, `coin_symbol` and the layout, so
/// removal locates exactly what creation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Upper-case coin symbol, e.g. `ETH`.
    pub coin_symbol: String,
    pub service_type: ServiceType,
    pub namespace: String,
    pub image_tag: String,
    /// False when the namespace is shared with other services.
    pub owns_namespace: bool,
}

impl ServiceDescriptor {
    pub fn new(
        name: &str,
        coin: &str,
        service_type: ServiceType,
        layout: &NamespaceLayout,
    ) -> Result<Self> {
        if !is_dns_label(name) {
            return Err(CoreError::InvalidName(name.to_string()));
        }
        if !is_coin_symbol(coin) {
            return Err(CoreError::InvalidCoin(coin.to_string()));
        }

        let coin_symbol = coin.to_ascii_uppercase();
        let (namespace, owns_namespace) = match layout {
            NamespaceLayout::Dedicated => (format!("{}-app", coin.to_ascii_lowercase()), true),
            NamespaceLayout::Shared(ns) => (ns.clone(), false),
        };

        Ok(Self {
            name: name.to_string(),
            image_tag: format!("idp/{}:latest", name),
            coin_symbol,
            service_type,
            namespace,
            owns_namespace,
        })
    }

    pub fn coin_lower(&self) -> String {
        self.coin_symbol.to_ascii_lowercase()
    }

    /// Cluster-scoped volume, shared by every service of the same coin.
    pub fn volume_name(&self) -> String {
        format!("{}-data-pv", self.coin_lower())
    }

    /// Namespace-scoped claim bound to [`Self::volume_name`].
    pub fn claim_name(&self) -> String {
        format!("{}-data", self.name)
    }

    pub fn application_name(&self) -> &str {
        &self.name
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.name)
    }

    /// Terraform address of the service's dashboard.
    pub fn dashboard_resource(&self) -> String {
        format!("grafana_dashboard.{}_apm", self.name.replace('-', "_"))
    }

    pub fn artifact_layout(&self) -> ArtifactLayout {
        ArtifactLayout {
            scaffold_dir: PathBuf::from(APPS_DIR).join(&self.name),
            manifests_dir: PathBuf::from(MANIFESTS_DIR).join(&self.name),
            application_file: PathBuf::from(APPLICATIONS_DIR).join(format!("{}.yaml", self.name)),
            dashboard_file: PathBuf::from(DASHBOARDS_DIR).join(format!("{}.tf", self.name)),
            legacy_dashboard_file: PathBuf::from(DASHBOARDS_DIR)
                .join("dashboards")
                .join(format!("{}.tf", self.name)),
        }
    }
}

/// Repository-relative paths owned by one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub scaffold_dir: PathBuf,
    pub manifests_dir: PathBuf,
    pub application_file: PathBuf,
    pub dashboard_file: PathBuf,
    /// Older dashboards were written one directory deeper.
    pub legacy_dashboard_file: PathBuf,
}

impl ArtifactLayout {
    /// The persisted set: everything creation commits and removal deletes.
    pub fn persisted(&self) -> [&PathBuf; 4] {
        [
            &self.scaffold_dir,
            &self.manifests_dir,
            &self.application_file,
            &self.dashboard_file,
        ]
    }

    /// Whether `path` falls inside the persisted set.
    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.persisted().iter().any(|owned| path.starts_with(owned))
    }
}

fn is_dns_label(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex is valid")
    });
    name.len() <= 63 && re.is_match(name)
}

fn is_coin_symbol(coin: &str) -> bool {
    crate::datastore::is_valid_symbol(coin)
}
