//! Descriptor Renderer: maps a [`ServiceDescriptor`] to the text of every
//! artifact a service owns.
//!
//! Rendering is pure. Writing to disk is a separate step
//! ([`crate::workspace::Workspace`]) so each write can be logged and retried on
//! its own.

use handlebars::Handlebars;
use idp_core::ServiceDescriptor;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::config::IdpConfig;
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Application source and build descriptor under `apps/<name>/`.
    Scaffold,
    Manifest,
    Application,
    Dashboard,
    /// Volume and claim manifests; applied directly, never committed.
    Storage,
}

impl ArtifactKind {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::Storage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpec {
    /// Output file name; also the override lookup key (`<name>.hbs`).
    pub name: String,
    pub kind: ArtifactKind,
    pub body: String,
}

impl TemplateSpec {
    fn builtin(name: &str, kind: ArtifactKind, body: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    templates: Vec<TemplateSpec>,
    vars: BTreeMap<String, String>,
}

impl TemplateSet {
    pub fn builtin() -> Self {
        use ArtifactKind::*;

        let templates = vec![
            TemplateSpec::builtin("main.go", Scaffold, include_str!("../templates/main.go.hbs")),
            TemplateSpec::builtin("go.mod", Scaffold, include_str!("../templates/go.mod.hbs")),
            TemplateSpec::builtin("Dockerfile", Scaffold, include_str!("../templates/Dockerfile.hbs")),
            TemplateSpec::builtin(
                "deployment.yaml",
                Manifest,
                include_str!("../templates/deployment.yaml.hbs"),
            ),
            TemplateSpec::builtin(
                "service.yaml",
                Manifest,
                include_str!("../templates/service.yaml.hbs"),
            ),
            TemplateSpec::builtin(
                "configmap.yaml",
                Manifest,
                include_str!("../templates/configmap.yaml.hbs"),
            ),
            TemplateSpec::builtin(
                "application.yaml",
                Application,
                include_str!("../templates/application.yaml.hbs"),
            ),
            TemplateSpec::builtin(
                "dashboard.tf",
                Dashboard,
                include_str!("../templates/dashboard.tf.hbs"),
            ),
            TemplateSpec::builtin(
                "persistent-volume.yaml",
                Storage,
                include_str!("../templates/persistent-volume.yaml.hbs"),
            ),
            TemplateSpec::builtin(
                "persistent-volume-claim.yaml",
                Storage,
                include_str!("../templates/persistent-volume-claim.yaml.hbs"),
            ),
        ];

        let mut vars = BTreeMap::new();
        vars.insert(
            "repo_url".to_string(),
            "https://github.com/example/platform.git".to_string(),
        );
        vars.insert("target_revision".to_string(), "HEAD".to_string());
        vars.insert("controller_namespace".to_string(), "argocd".to_string());

        Self { templates, vars }
    }

    /// Built-in templates with config-provided values and overrides applied.
    pub async fn from_config(config: &IdpConfig, repo_root: &Path) -> Result<Self> {
        let set = Self::builtin()
            .with_var("repo_url", &config.repository.repo_url)
            .with_var("target_revision", &config.gitops.target_revision)
            .with_var("controller_namespace", &config.gitops.controller_namespace);

        match &config.templates_dir {
            Some(dir) => set.override_from_dir(&repo_root.join(dir)).await,
            None => Ok(set),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Replace every template that has a `<name>.hbs` file in `dir`.
    pub async fn override_from_dir(mut self, dir: &Path) -> Result<Self> {
        for template in &mut self.templates {
            let candidate = dir.join(format!("{}.hbs", template.name));
            if fs::try_exists(&candidate).await? {
                debug!(template = %template.name, path = %candidate.display(), "Using template override");
                template.body = fs::read_to_string(&candidate).await?;
            }
        }
        Ok(self)
    }

    pub fn templates(&self) -> &[TemplateSpec] {
        &self.templates
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub template: String,
    pub kind: ArtifactKind,
    pub content: String,
}

/// Rendered output keyed by repository-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedArtifacts {
    files: BTreeMap<PathBuf, RenderedArtifact>,
}

impl RenderedArtifacts {
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &RenderedArtifact)> {
        self.files.iter().map(|(path, artifact)| (path.as_path(), artifact))
    }

    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = (&Path, &RenderedArtifact)> {
        self.iter().filter(move |(_, artifact)| artifact.kind == kind)
    }

    pub fn get(&self, path: &Path) -> Option<&RenderedArtifact> {
        self.files.get(path)
    }

    pub fn by_template(&self, template: &str) -> Option<&RenderedArtifact> {
        self.files.values().find(|artifact| artifact.template == template)
    }

    /// Content of a template's output, or a render error naming it.
    pub fn content_of(&self, template: &str) -> Result<&str> {
        self.by_template(template)
            .map(|artifact| artifact.content.as_str())
            .ok_or_else(|| OrchestratorError::Render(format!("template {} not rendered", template)))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub fn render(descriptor: &ServiceDescriptor, templates: &TemplateSet) -> Result<RenderedArtifacts> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);

    let context = context(descriptor, &templates.vars);
    let layout = descriptor.artifact_layout();
    let mut files = BTreeMap::new();

    for template in &templates.templates {
        let content = handlebars
            .render_template(&template.body, &context)
            .map_err(|e| OrchestratorError::Render(format!("{}: {}", template.name, e)))?;

        let path = match template.kind {
            ArtifactKind::Scaffold => layout.scaffold_dir.join(&template.name),
            ArtifactKind::Manifest => layout.manifests_dir.join(&template.name),
            ArtifactKind::Application => layout.application_file.clone(),
            ArtifactKind::Dashboard => layout.dashboard_file.clone(),
            ArtifactKind::Storage => PathBuf::from("storage").join(&template.name),
        };

        files.insert(
            path,
            RenderedArtifact {
                template: template.name.clone(),
                kind: template.kind,
                content,
            },
        );
    }

    Ok(RenderedArtifacts { files })
}

fn context(descriptor: &ServiceDescriptor, vars: &BTreeMap<String, String>) -> Value {
    let layout = descriptor.artifact_layout();
    let mut map: Map<String, Value> = vars
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    let derived = [
        ("name", descriptor.name.clone()),
        ("coin", descriptor.coin_symbol.clone()),
        ("coin_lower", descriptor.coin_lower()),
        ("service_type", descriptor.service_type.to_string()),
        ("namespace", descriptor.namespace.clone()),
        ("image", descriptor.image_tag.clone()),
        ("volume", descriptor.volume_name()),
        ("claim", descriptor.claim_name()),
        ("config_map", descriptor.config_map_name()),
        ("application", descriptor.application_name().to_string()),
        ("dashboard_id", descriptor.name.replace('-', "_")),
        (
            "manifests_path",
            layout.manifests_dir.to_string_lossy().replace('\\', "/"),
        ),
    ];
    for (key, value) in derived {
        map.insert(key.to_string(), Value::String(value));
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idp_core::{NamespaceLayout, ServiceType};
    use tempfile::TempDir;

    fn eth() -> ServiceDescriptor {
        ServiceDescriptor::new(
            "eth-collector",
            "eth",
            ServiceType::Collector,
            &NamespaceLayout::Dedicated,
        )
        .unwrap()
    }

    #[test]
    fn test_render_is_deterministic() {
        let templates = TemplateSet::builtin();
        let first = render(&eth(), &templates).unwrap();
        let second = render(&eth(), &templates).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_paths_follow_layout() {
        let descriptor = eth();
        let layout = descriptor.artifact_layout();
        let artifacts = render(&descriptor, &TemplateSet::builtin()).unwrap();

        assert!(artifacts.get(&layout.scaffold_dir.join("main.go")).is_some());
        assert!(artifacts.get(&layout.scaffold_dir.join("Dockerfile")).is_some());
        assert!(artifacts.get(&layout.manifests_dir.join("deployment.yaml")).is_some());
        assert!(artifacts.get(&layout.application_file).is_some());
        assert!(artifacts.get(&layout.dashboard_file).is_some());

        for (path, artifact) in artifacts.iter() {
            assert_eq!(
                layout.contains(path),
                artifact.kind.is_persisted(),
                "{}",
                path.display()
            );
        }
    }

    #[test]
    fn test_manifest_content() {
        let artifacts = render(&eth(), &TemplateSet::builtin()).unwrap();

        let deployment = artifacts.content_of("deployment.yaml").unwrap();
        assert!(deployment.contains("namespace: eth-app"));
        assert!(deployment.contains("image: idp/eth-collector:latest"));
        assert!(deployment.contains("claimName: eth-collector-data"));

        let configmap = artifacts.content_of("configmap.yaml").unwrap();
        assert!(configmap.contains(r#"COIN_SYMBOL: "ETH""#));

        let pv = artifacts.content_of("persistent-volume.yaml").unwrap();
        assert!(pv.contains("name: eth-data-pv"));

        let dashboard = artifacts.content_of("dashboard.tf").unwrap();
        assert!(dashboard.contains(r#"resource "grafana_dashboard" "eth_collector_apm""#));
    }

    #[test]
    fn test_values_are_not_html_escaped() {
        let templates = TemplateSet::builtin().with_var("repo_url", "https://git.local/p.git?a=1&b=2");
        let artifacts = render(&eth(), &templates).unwrap();

        let application = artifacts.content_of("application.yaml").unwrap();
        assert!(application.contains("repoURL: https://git.local/p.git?a=1&b=2"));
        assert!(application.contains("path: gitops/manifests/eth-collector"));
    }

    #[tokio::test]
    async fn test_override_from_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("service.yaml.hbs"), "svc {{name}} in {{namespace}}\n").unwrap();

        let templates = TemplateSet::builtin()
            .override_from_dir(dir.path())
            .await
            .unwrap();
        let artifacts = render(&eth(), &templates).unwrap();

        assert_eq!(
            artifacts.content_of("service.yaml").unwrap(),
            "svc eth-collector in eth-app\n"
        );
    }

    #[tokio::test]
    async fn test_unknown_variable_is_render_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("go.mod.hbs"), "module {{module_path}}\n").unwrap();

        let templates = TemplateSet::builtin()
            .override_from_dir(dir.path())
            .await
            .unwrap();
        let err = render(&eth(), &templates).unwrap_err();

        assert!(matches!(err, OrchestratorError::Render(ref message) if message.starts_with("go.mod")));
    }
}
