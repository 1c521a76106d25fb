use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod s3;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote object storage, addressed by key.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Writes the object at `key` to `local_path`, creating parent directories.
    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()>;

    async fn upload_file(&self, local_path: &Path, key: &str) -> StorageResult<()>;

    async fn upload_bytes(&self, data: Bytes, key: &str) -> StorageResult<()>;

    /// Time-limited GET URL for `key`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}

pub fn content_type_for(key: &str) -> String {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        _ => mime_guess::from_path(key).first_or_octet_stream().to_string(),
    }
}
