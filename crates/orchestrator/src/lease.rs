//! RAII lease serializing lifecycle commands per service name.
//!
//! Two invocations acting on the same service at once would race on the
//! working tree and on cluster state. The lease is an exclusive lock file
//! created with create-new semantics and removed when the guard is dropped,
//! including on early return or panic. A lock left behind by a killed process
//! is reclaimed once its holder is gone or it is older than the configured age.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

const GIT_LOCK_DIR: &str = ".git/idp-locks";
const FALLBACK_LOCK_DIR: &str = ".idp/locks";

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseHolder {
    pub run_id: Uuid,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LeaseHolder {
    fn current(run_id: Uuid) -> Self {
        Self {
            run_id,
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

pub struct ServiceLease {
    service: String,
    path: PathBuf,
    run_id: Uuid,
    released: bool,
}

impl ServiceLease {
    /// Directory holding lock files; inside `.git` when present so locks are never staged.
    pub fn lock_dir(repo_root: &Path) -> PathBuf {
        if repo_root.join(".git").is_dir() {
            repo_root.join(GIT_LOCK_DIR)
        } else {
            repo_root.join(FALLBACK_LOCK_DIR)
        }
    }

    pub fn lock_path(repo_root: &Path, service: &str) -> PathBuf {
        Self::lock_dir(repo_root).join(format!("{}.lock", service))
    }

    /// Take the lease for `service` or fail with [`OrchestratorError::Locked`].
    ///
    /// An existing lock is reclaimed when it is stale: its holder process has
    /// exited, or it was taken more than `stale_after` ago.
    pub fn acquire(
        repo_root: &Path,
        service: &str,
        run_id: Uuid,
        stale_after: Duration,
    ) -> Result<Self> {
        std::fs::create_dir_all(Self::lock_dir(repo_root))?;
        let path = Self::lock_path(repo_root, service);

        let holder = LeaseHolder::current(run_id);
        match Self::create(&path, &holder) {
            Err(OrchestratorError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                let Some(reason) = stale_reason(&path, stale_after) else {
                    return Err(Self::locked(service, &path));
                };
                warn!(service = %service, path = %path.display(), "Reclaiming stale lease: {}", reason);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                // Another reclaimer may win the race; it then holds the lease.
                match Self::create(&path, &holder) {
                    Err(OrchestratorError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                        return Err(Self::locked(service, &path))
                    }
                    other => other?,
                }
            }
            other => other?,
        }

        debug!(service = %service, run_id = %run_id, path = %path.display(), "Lease acquired");

        Ok(Self {
            service: service.to_string(),
            path,
            run_id,
            released: false,
        })
    }

    fn create(path: &Path, holder: &LeaseHolder) -> Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let body = serde_json::to_string(holder).map_err(std::io::Error::from)?;
        writeln!(file, "{}", body)?;
        Ok(())
    }

    fn locked(service: &str, path: &Path) -> OrchestratorError {
        OrchestratorError::Locked {
            service: service.to_string(),
            path: path.display().to_string(),
        }
    }

    /// Remove a leftover lock regardless of its holder. Returns whether one existed.
    pub fn force_unlock(repo_root: &Path, service: &str) -> Result<bool> {
        let path = Self::lock_path(repo_root, service);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(service = %service, path = %path.display(), "Lease forcibly removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Release explicitly, surfacing removal errors instead of logging them.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        std::fs::remove_file(&self.path)?;
        debug!(service = %self.service, "Lease released");
        Ok(())
    }
}

impl Drop for ServiceLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(
                service = %self.service,
                path = %self.path.display(),
                error = %e,
                "Failed to remove lease file"
            );
        } else {
            debug!(service = %self.service, "Lease dropped");
        }
    }
}

/// Why the lock at `path` may be taken over, or `None` while it is live.
fn stale_reason(path: &Path, stale_after: Duration) -> Option<String> {
    let holder = std::fs::read_to_string(path)
        .ok()
        .and_then(|body| serde_json::from_str::<LeaseHolder>(body.trim()).ok());

    let age = match &holder {
        Some(holder) => {
            if !process_alive(holder.pid) {
                return Some(format!("holder process {} has exited", holder.pid));
            }
            (Utc::now() - holder.acquired_at).to_std().unwrap_or_default()
        }
        // Unreadable body: fall back to the file's age.
        None => std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .unwrap_or_default(),
    };

    (age > stale_after).then(|| format!("held for {}s", age.as_secs()))
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
