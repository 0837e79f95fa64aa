//! Writes rendered artifacts into the repository working tree and removes them.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::Result;
use crate::render::{ArtifactKind, RenderedArtifacts};

pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    pub async fn exists(&self, relative: &Path) -> Result<bool> {
        Ok(fs::try_exists(self.path(relative)).await?)
    }

    /// Write the artifacts of the given kinds; returns the relative paths written.
    ///
    /// Storage artifacts are never written. Existing files are overwritten.
    pub async fn write_artifacts(
        &self,
        artifacts: &RenderedArtifacts,
        kinds: &[ArtifactKind],
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for kind in kinds.iter().filter(|kind| kind.is_persisted()) {
            for (relative, artifact) in artifacts.of_kind(*kind) {
                self.write_file(relative, &artifact.content).await?;
                written.push(relative.to_path_buf());
            }
        }
        Ok(written)
    }

    /// Atomic write via temp file + rename.
    pub async fn write_file(&self, relative: &Path, content: &str) -> Result<()> {
        let path = self.path(relative);
        let parent = path.parent().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", path.display()),
            )
        })?;
        fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{}.tmp", file_name));

        debug!("Writing {:?}", path);
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    /// Remove a file or directory tree; returns false if it was already absent.
    pub async fn remove(&self, relative: &Path) -> Result<bool> {
        let path = self.path(relative);
        let metadata = match fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Already absent: {:?}", path);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        info!("Removed {:?}", relative);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render, TemplateSet};
    use idp_core::{NamespaceLayout, ServiceDescriptor, ServiceType};
    use tempfile::TempDir;

    fn artifacts() -> (ServiceDescriptor, RenderedArtifacts) {
        let descriptor = ServiceDescriptor::new(
            "eth-collector",
            "eth",
            ServiceType::Collector,
            &NamespaceLayout::Dedicated,
        )
        .unwrap();
        let artifacts = render(&descriptor, &TemplateSet::builtin()).unwrap();
        (descriptor, artifacts)
    }

    #[tokio::test]
    async fn test_write_selected_kinds() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        let (descriptor, artifacts) = artifacts();
        let layout = descriptor.artifact_layout();

        let written = workspace
            .write_artifacts(&artifacts, &[ArtifactKind::Scaffold])
            .await
            .unwrap();

        assert_eq!(written.len(), 3);
        assert!(dir.path().join(&layout.scaffold_dir).join("main.go").exists());
        assert!(!dir.path().join(&layout.manifests_dir).exists());
    }

    #[tokio::test]
    async fn test_storage_is_never_written() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        let (_, artifacts) = artifacts();

        let written = workspace
            .write_artifacts(&artifacts, &[ArtifactKind::Storage])
            .await
            .unwrap();

        assert!(written.is_empty());
        assert!(!dir.path().join("storage").exists());
    }

    #[tokio::test]
    async fn test_rewrite_overwrites() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        let relative = Path::new("gitops/apps/eth-collector.yaml");

        workspace.write_file(relative, "old").await.unwrap();
        workspace.write_file(relative, "new").await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(relative)).unwrap();
        assert_eq!(content, "new");
        assert!(!dir.path().join("gitops/apps/.eth-collector.yaml.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_file_and_dir() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        let (descriptor, artifacts) = artifacts();
        let layout = descriptor.artifact_layout();
        workspace
            .write_artifacts(&artifacts, &[ArtifactKind::Manifest, ArtifactKind::Application])
            .await
            .unwrap();

        assert!(workspace.remove(&layout.manifests_dir).await.unwrap());
        assert!(workspace.remove(&layout.application_file).await.unwrap());
        assert!(!workspace.exists(&layout.manifests_dir).await.unwrap());

        assert!(!workspace.remove(&layout.application_file).await.unwrap());
    }
}
