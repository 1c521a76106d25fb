use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::PipelineError;

pub const TRANSCODE_MEDIA: &str = "transcode_media";

/// Named job arguments, e.g. `{"media_id": "..."}`.
pub type JobArgs = Map<String, Value>;

/// Arguments of a [`TRANSCODE_MEDIA`] job.
pub fn transcode_args(media_id: Uuid) -> JobArgs {
    let mut args = JobArgs::new();
    args.insert("media_id".to_string(), Value::String(media_id.to_string()));
    args
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Unknown job kind '{0}'")]
    UnknownKind(String),

    #[error("Invalid job arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// A unit of queued work. Lives only in memory.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub args: JobArgs,
    pub enqueued_at: OffsetDateTime,
}

impl Job {
    pub fn new(kind: impl Into<String>, args: JobArgs) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            args,
            enqueued_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn uuid_arg(&self, name: &str) -> Result<Uuid, JobError> {
        let raw = self
            .args
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| JobError::InvalidArguments(format!("missing '{}'", name)))?;

        Uuid::parse_str(raw)
            .map_err(|e| JobError::InvalidArguments(format!("'{}' is not a uuid: {}", name, e)))
    }
}
