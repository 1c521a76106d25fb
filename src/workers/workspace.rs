//! Per-run scratch directory.
//!
//! A [`Workspace`] is owned by exactly one pipeline run. The directory is
//! removed when the workspace is released or dropped, so every exit path of
//! a run (success, error, panic, cancelled future) cleans up after itself.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::warn;
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult};

pub const HLS_DIR: &str = "hls";
pub const POSTER_FILE: &str = "poster.jpg";

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates `<root>/<media_id>-<random>`; the random suffix keeps a retry
    /// from ever seeing a previous run's files.
    pub async fn create(root: &Path, media_id: Uuid) -> PipelineResult<Self> {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            PipelineError::workspace(format!("cannot create {}: {}", root.display(), e))
        })?;

        let root = root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&format!("{}-", media_id))
                .tempdir_in(root)
        })
        .await
        .map_err(|e| PipelineError::workspace(e.to_string()))?
        .map_err(|e| PipelineError::workspace(format!("cannot create workspace: {}", e)))?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Renditions and the manifest go here.
    pub fn hls_dir(&self) -> PathBuf {
        self.dir.path().join(HLS_DIR)
    }

    pub fn poster_path(&self) -> PathBuf {
        self.dir.path().join(POSTER_FILE)
    }

    /// Download target for a remote source; `extension` includes the dot.
    pub fn source_path(&self, extension: &str) -> PathBuf {
        self.dir.path().join(format!("source{}", extension))
    }

    /// Removes the directory tree, logging rather than failing on error.
    pub async fn release(self) {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to remove workspace {}: {}", path.display(), e),
            Err(e) => warn!("Workspace cleanup task for {} failed: {}", path.display(), e),
        }
    }
}
