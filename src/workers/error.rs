use thiserror::Error;
use uuid::Uuid;

use crate::infrastructure::storage::StorageError;
use crate::modules::media::repository::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source missing: {0}")]
    SourceMissing(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Encoder failed ({code}): {stderr}")]
    EncodeFailed { code: String, stderr: String },

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Media {0} not found")]
    AssetNotFound(Uuid),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl PipelineError {
    pub fn source_missing(msg: impl Into<String>) -> Self {
        Self::SourceMissing(msg.into())
    }

    pub fn transfer_failed(msg: impl Into<String>) -> Self {
        Self::TransferFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }
}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => Self::SourceMissing(format!("remote object {}", key)),
            other => Self::TransferFailed(other.to_string()),
        }
    }
}
