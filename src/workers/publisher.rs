use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult};
use super::source::{StorageLocation, key_parent};
use super::transcoder::MANIFEST_NAME;
use super::workspace::{HLS_DIR, POSTER_FILE};
use crate::infrastructure::storage::ObjectStorage;

fn join_key(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", parent, segment)
    }
}

/// Key of the published manifest for a source stored under `source_key`.
pub fn manifest_key(source_key: &str) -> String {
    join_key(&join_key(key_parent(source_key), HLS_DIR), MANIFEST_NAME)
}

/// True when `key` already names a published manifest rather than a source.
pub fn is_manifest_key(key: &str) -> bool {
    let mut segments = key.rsplit('/');
    segments.next() == Some(MANIFEST_NAME) && segments.next() == Some(HLS_DIR)
}

/// Moves a finished output tree into durable storage next to its source.
pub struct OutputPublisher {
    storage: Arc<dyn ObjectStorage>,
}

impl OutputPublisher {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Publishes `hls_dir` and `poster` and returns the manifest's final key.
    /// Returns an error unless every file landed.
    pub async fn publish(
        &self,
        location: &StorageLocation,
        hls_dir: &Path,
        poster: &Path,
    ) -> PipelineResult<String> {
        if !is_file(&hls_dir.join(MANIFEST_NAME)).await {
            return Err(PipelineError::publish_failed(format!(
                "manifest missing from {}",
                hls_dir.display()
            )));
        }

        match location {
            StorageLocation::Local { path, .. } => {
                let parent = path.parent().ok_or_else(|| {
                    PipelineError::publish_failed(format!("{} has no parent", path.display()))
                })?;
                publish_local(hls_dir, poster, parent).await?;
            }
            StorageLocation::Remote(key) => {
                self.publish_remote(hls_dir, poster, key_parent(key)).await?;
            }
        }

        Ok(manifest_key(location.key()))
    }

    async fn publish_remote(
        &self,
        hls_dir: &Path,
        poster: &Path,
        parent: &str,
    ) -> PipelineResult<()> {
        let prefix = join_key(parent, HLS_DIR);
        let root = hls_dir.to_path_buf();
        let mut files = tokio::task::spawn_blocking(move || list_files(&root))
            .await
            .map_err(|e| PipelineError::publish_failed(e.to_string()))?
            .map_err(|e| PipelineError::publish_failed(format!("cannot list output: {}", e)))?;

        // Upload the manifest last so it never references missing renditions.
        files.sort_by_key(|rel| (rel == Path::new(MANIFEST_NAME), rel.clone()));

        for rel in &files {
            let key = join_key(&prefix, &relative_key(rel));
            debug!("Uploading {}", key);
            self.storage
                .upload_file(&hls_dir.join(rel), &key)
                .await
                .map_err(|e| PipelineError::publish_failed(e.to_string()))?;
        }

        if is_file(poster).await {
            let key = join_key(parent, POSTER_FILE);
            self.storage
                .upload_file(poster, &key)
                .await
                .map_err(|e| PipelineError::publish_failed(e.to_string()))?;
        } else {
            warn!("No poster at {}, skipping", poster.display());
        }

        info!("Published {} files under {}", files.len(), prefix);
        Ok(())
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// Copy-then-swap into `<parent>/hls` so readers see either the old tree or
/// the new one. Everything that can fail runs before the swap.
async fn publish_local(hls_dir: &Path, poster: &Path, parent: &Path) -> PipelineResult<()> {
    let src = hls_dir.to_path_buf();
    let poster = poster.to_path_buf();
    let parent = parent.to_path_buf();

    tokio::task::spawn_blocking(move || swap_in_tree(&src, &poster, &parent))
        .await
        .map_err(|e| PipelineError::publish_failed(e.to_string()))?
        .map_err(|e| PipelineError::publish_failed(format!("local publish: {}", e)))
}

fn swap_in_tree(src: &Path, poster: &Path, parent: &Path) -> io::Result<()> {
    let target = parent.join(HLS_DIR);
    let run = Uuid::new_v4().simple().to_string();
    let staging = parent.join(format!(".{}-staging-{}", HLS_DIR, run));
    let retired = parent.join(format!(".{}-old-{}", HLS_DIR, run));

    if let Err(e) = copy_tree(src, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    if poster.is_file() {
        if let Err(e) = std::fs::copy(poster, parent.join(POSTER_FILE)) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
    }

    let had_previous = target.exists();
    if had_previous {
        if let Err(e) = std::fs::rename(&target, &retired) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
    }

    if let Err(e) = std::fs::rename(&staging, &target) {
        if had_previous {
            let _ = std::fs::rename(&retired, &target);
        }
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    if had_previous {
        if let Err(e) = std::fs::remove_dir_all(&retired) {
            warn!("Failed to remove previous output {}: {}", retired.display(), e);
        }
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &to)?;
        } else {
            std::fs::copy(entry.path(), &to)?;
        }
    }
    Ok(())
}

/// Files under `root`, relative to it.
fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                walk(root, &path, out)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

/// Relative path with `/` separators regardless of platform.
fn relative_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
