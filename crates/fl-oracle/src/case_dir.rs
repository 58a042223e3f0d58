//! Per-attempt solver working directories.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A solver case directory.
///
/// Scratch directories are removed when the guard drops, whether the attempt
/// succeeded or not. Retained directories are left in place for inspection.
#[derive(Debug)]
pub struct CaseDir {
    path: PathBuf,
    retain: bool,
}

impl CaseDir {
    /// Fresh directory removed on drop. Any stale content at `path` is wiped.
    pub async fn scratch(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::create(path.into(), false).await
    }

    /// Fresh directory that outlives the guard.
    pub async fn retained(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::create(path.into(), true).await
    }

    async fn create(path: PathBuf, retain: bool) -> io::Result<Self> {
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path, retain })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CaseDir {
    fn drop(&mut self) {
        if self.retain {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch case directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove scratch case directory"
            ),
        }
    }
}
