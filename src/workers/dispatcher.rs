use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::job::{Job, JobError, TRANSCODE_MEDIA};
use super::pipeline::{MediaPipeline, PipelineOutcome};
use super::scheduler::JobHandler;

/// Routes dequeued jobs to their handler by kind.
pub struct JobDispatcher {
    pipeline: Arc<MediaPipeline>,
}

impl JobDispatcher {
    pub fn new(pipeline: Arc<MediaPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for JobDispatcher {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        match job.kind.as_str() {
            TRANSCODE_MEDIA => {
                let media_id = job.uuid_arg("media_id")?;
                match self.pipeline.process(media_id).await? {
                    PipelineOutcome::Failed { error, .. } => Err(error.into()),
                    PipelineOutcome::Ready { manifest_key } => {
                        info!("Media {} published at {}", media_id, manifest_key);
                        Ok(())
                    }
                    PipelineOutcome::Skipped => Ok(()),
                }
            }
            other => Err(JobError::UnknownKind(other.to_string())),
        }
    }
}
