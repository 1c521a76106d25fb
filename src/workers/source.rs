//! Source classification and resolution.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use super::error::{PipelineError, PipelineResult};
use super::workspace::Workspace;
use crate::infrastructure::storage::ObjectStorage;

const DEFAULT_EXTENSION: &str = ".mp4";

/// Where a media asset's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// A file served from local disk; `key` is the stored key, `path` the
    /// file it maps to.
    Local { key: String, path: PathBuf },
    /// An object storage key.
    Remote(String),
}

impl StorageLocation {
    pub fn key(&self) -> &str {
        match self {
            StorageLocation::Local { key, .. } => key,
            StorageLocation::Remote(key) => key,
        }
    }
}

/// Maps stored keys to locations. Keys starting with `prefix` are local and
/// resolve relative to `root`; everything else is remote.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    prefix: String,
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            root: root.into(),
        }
    }

    pub fn classify(&self, key: &str) -> StorageLocation {
        if !self.prefix.is_empty() && key.starts_with(&self.prefix) {
            let joined = self.root.join(key.trim_start_matches('/'));
            let path = std::path::absolute(&joined).unwrap_or(joined);
            StorageLocation::Local {
                key: key.to_string(),
                path,
            }
        } else {
            StorageLocation::Remote(key.to_string())
        }
    }
}

/// Everything before the last `/` of a key, or `""` for a bare name.
pub fn key_parent(key: &str) -> &str {
    key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// `.ext` taken from `filename`, or `.mp4` when there is no usable one.
pub fn source_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub struct SourceResolver {
    storage: Arc<dyn ObjectStorage>,
}

impl SourceResolver {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Returns a local file holding the source bytes, downloading remote
    /// sources into the workspace.
    pub async fn resolve(
        &self,
        location: &StorageLocation,
        filename: &str,
        workspace: &Workspace,
    ) -> PipelineResult<PathBuf> {
        match location {
            StorageLocation::Local { path, .. } => Self::resolve_local(path).await,
            StorageLocation::Remote(key) => self.download(key, filename, workspace).await,
        }
    }

    async fn resolve_local(path: &Path) -> PipelineResult<PathBuf> {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PipelineError::source_missing(format!(
                "refusing path outside the media root: {}",
                path.display()
            )));
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(path.to_path_buf()),
            _ => Err(PipelineError::source_missing(format!(
                "local source missing: {}",
                path.display()
            ))),
        }
    }

    async fn download(
        &self,
        key: &str,
        filename: &str,
        workspace: &Workspace,
    ) -> PipelineResult<PathBuf> {
        let dest = workspace.source_path(&source_extension(filename));
        info!("Downloading source {} to {}", key, dest.display());

        self.storage.download(key, &dest).await?;

        // The storage call can report success without leaving a usable file.
        let size = match tokio::fs::metadata(&dest).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                let found = list_dir(workspace.path()).await;
                error!(
                    "Source missing after download. Expected {}, found {:?}",
                    dest.display(),
                    found
                );
                return Err(PipelineError::transfer_failed(format!(
                    "downloaded file not found: {}",
                    dest.display()
                )));
            }
        };

        if size == 0 {
            return Err(PipelineError::transfer_failed(format!(
                "downloaded file is empty: {}",
                key
            )));
        }

        info!("Source downloaded ({} bytes)", size);
        Ok(dest)
    }
}

async fn list_dir(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names
}
