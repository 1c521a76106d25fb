use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::Document => "document",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(MediaKind::Video),
            "image" => Ok(MediaKind::Image),
            "document" => Ok(MediaKind::Document),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// Persisted processing status. A FAILED video can be queued again and
/// restarts from PENDING; a READY one is not transcoded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Ready,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Ready => "ready",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "ready" => Ok(ProcessingStatus::Ready),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub kind: MediaKind,
    /// Local path under the static prefix, or an object storage key.
    /// Rewritten to the published manifest key once a run succeeds.
    pub storage_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: ProcessingStatus,
}

#[derive(Debug, FromRow)]
pub struct MediaRow {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub media_type: String,
    pub file_path: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub processing_status: String,
}

impl TryFrom<MediaRow> for MediaAsset {
    type Error = String;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            creator_id: row.creator_id,
            kind: row.media_type.parse()?,
            storage_key: row.file_path,
            filename: row.filename,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            status: row.processing_status.parse()?,
        })
    }
}
