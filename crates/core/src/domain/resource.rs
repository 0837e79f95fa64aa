use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Namespace,
    Deployment,
    Service,
    ConfigMap,
    PersistentVolume,
    PersistentVolumeClaim,
    Pod,
    /// Declarative application object owned by the config-sync controller.
    Application,
}

impl ResourceKind {
    /// Resource name as understood by `kubectl`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Deployment => "deployment",
            Self::Service => "service",
            Self::ConfigMap => "configmap",
            Self::PersistentVolume => "persistentvolume",
            Self::PersistentVolumeClaim => "persistentvolumeclaim",
            Self::Pod => "pod",
            Self::Application => "application",
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::Namespace | Self::PersistentVolume)
    }
}

/// Address of a single cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn namespaced(kind: ResourceKind, name: impl Into<String>, ns: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: Some(ns.into()),
        }
    }

    pub fn cluster(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: None,
        }
    }

    pub fn namespace(name: impl Into<String>) -> Self {
        Self::cluster(ResourceKind::Namespace, name)
    }

    pub fn deployment(name: impl Into<String>, ns: impl Into<String>) -> Self {
        Self::namespaced(ResourceKind::Deployment, name, ns)
    }

    pub fn persistent_volume(name: impl Into<String>) -> Self {
        Self::cluster(ResourceKind::PersistentVolume, name)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} (namespace {})", self.kind.as_str(), self.name, ns),
            None => write!(f, "{}/{}", self.kind.as_str(), self.name),
        }
    }
}

/// Logical state of a cluster object as projected from repeated status queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Absent,
    Pending,
    Active,
    Terminating,
    /// The target state was not reached before the polling deadline.
    Stuck,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Stuck => "stuck",
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
