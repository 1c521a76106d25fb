use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::model::{MediaKind, ProcessingStatus};

#[derive(Debug, Serialize, ToSchema)]
pub struct MediaResponse {
    pub id: Uuid,
    pub kind: MediaKind,
    pub status: ProcessingStatus,
    pub storage_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// Only set once the media is ready. A signed URL for object storage,
    /// the key itself for locally served files.
    pub playback_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TranscodeResponse {
    pub media_id: Uuid,
    pub job_id: Uuid,
    pub status: ProcessingStatus,
}
