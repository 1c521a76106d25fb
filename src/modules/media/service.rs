use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{MediaResponse, TranscodeResponse};
use super::model::{MediaAsset, MediaKind, ProcessingStatus};
use super::repository::{AssetStore, StoreError};
use crate::common::response::HttpError;
use crate::infrastructure::storage::{ObjectStorage, StorageError};
use crate::workers::job::{TRANSCODE_MEDIA, transcode_args};
use crate::workers::scheduler::{JobQueue, SchedulerError};
use crate::workers::source::{StorageLayout, StorageLocation};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media not found")]
    NotFound(Uuid),

    #[error("Only video media can be transcoded")]
    NotVideo(Uuid),

    #[error("Media is already transcoded")]
    AlreadyReady(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] SchedulerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HttpError for MediaError {
    fn status_code(&self) -> StatusCode {
        match self {
            MediaError::NotFound(_) => StatusCode::NOT_FOUND,
            MediaError::NotVideo(_) => StatusCode::BAD_REQUEST,
            MediaError::AlreadyReady(_) => StatusCode::CONFLICT,
            MediaError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            MediaError::Store(_) | MediaError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone)]
pub struct MediaService {
    assets: Arc<dyn AssetStore>,
    storage: Arc<dyn ObjectStorage>,
    queue: JobQueue,
    layout: StorageLayout,
    signed_url_ttl: Duration,
}

impl MediaService {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        storage: Arc<dyn ObjectStorage>,
        queue: JobQueue,
        layout: StorageLayout,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            assets,
            storage,
            queue,
            layout,
            signed_url_ttl,
        }
    }

    async fn load(&self, id: Uuid) -> Result<MediaAsset, MediaError> {
        self.assets.get(id).await?.ok_or(MediaError::NotFound(id))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<MediaResponse, MediaError> {
        let asset = self.load(id).await?;

        let playback_url = if asset.status == ProcessingStatus::Ready {
            match self.layout.classify(&asset.storage_key) {
                StorageLocation::Local { key, .. } => Some(key),
                StorageLocation::Remote(key) => {
                    Some(self.storage.presign_get(&key, self.signed_url_ttl).await?)
                }
            }
        } else {
            None
        };

        Ok(MediaResponse {
            id: asset.id,
            kind: asset.kind,
            status: asset.status,
            storage_key: asset.storage_key,
            filename: asset.filename,
            content_type: asset.content_type,
            size_bytes: asset.size_bytes,
            playback_url,
        })
    }

    /// Marks the media PENDING and queues a transcode run for it. Media that
    /// is already READY points at its published manifest and is refused.
    pub async fn request_transcode(&self, id: Uuid) -> Result<TranscodeResponse, MediaError> {
        let mut asset = self.load(id).await?;
        if asset.kind != MediaKind::Video {
            return Err(MediaError::NotVideo(id));
        }
        if asset.status == ProcessingStatus::Ready {
            return Err(MediaError::AlreadyReady(id));
        }

        let previous = asset.status;
        asset.status = ProcessingStatus::Pending;
        self.assets.save(&asset).await?;

        let job_id = match self.queue.enqueue(TRANSCODE_MEDIA, transcode_args(id)) {
            Ok(job_id) => job_id,
            Err(e) => {
                asset.status = previous;
                if let Err(save_err) = self.assets.save(&asset).await {
                    warn!("Failed to restore status of media {}: {}", id, save_err);
                }
                return Err(e.into());
            }
        };
        info!("Queued transcode of media {} as job {}", id, job_id);

        Ok(TranscodeResponse {
            media_id: id,
            job_id,
            status: asset.status,
        })
    }
}
