//! Single-consumer in-memory job queue.
//!
//! [`JobQueue`] is the cheap, cloneable enqueue handle given to request
//! handlers. [`JobScheduler`] owns the one background worker that drains the
//! queue in FIFO order, one job at a time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{Job, JobArgs, JobError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Worker already running")]
    AlreadyStarted,
}

/// Executes one dequeued job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

#[derive(Clone)]
pub struct JobQueue {
    sender: Sender<Job>,
}

impl JobQueue {
    /// Appends a job to the tail of the queue. Never blocks.
    pub fn enqueue(&self, kind: &str, args: JobArgs) -> Result<Uuid, SchedulerError> {
        let job = Job::new(kind, args);
        let id = job.id;
        debug!(job_id = %id, kind = %job.kind, args = ?job.args, "Enqueuing job");
        self.sender
            .try_send(job)
            .map_err(|_| SchedulerError::QueueClosed)?;
        Ok(id)
    }

    /// Jobs waiting to be picked up.
    pub fn len(&self) -> usize {
        self.sender.len()
    }
}

pub struct JobScheduler {
    queue: JobQueue,
    receiver: Receiver<Job>,
    handler: Arc<dyn JobHandler>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self {
            queue: JobQueue { sender },
            receiver,
            handler,
            cancel: CancellationToken::new(),
            worker: None,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Spawns the worker. Jobs enqueued before this call are kept and run
    /// first.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.worker.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let receiver = self.receiver.clone();
        let handler = Arc::clone(&self.handler);
        let cancel = self.cancel.clone();
        self.worker = Some(tokio::spawn(run_worker(receiver, handler, cancel)));

        info!("[Worker] Started.");
        Ok(())
    }

    /// Asks the worker to exit and waits for it. A job already running is
    /// allowed to finish first. Jobs still queued are discarded, so a later
    /// [`start`](Self::start) begins with an empty queue.
    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.cancel.cancel();
        if let Err(e) = worker.await {
            error!("[Worker] Worker task ended abnormally: {}", e);
        }

        let mut abandoned = 0usize;
        while let Ok(job) = self.receiver.try_recv() {
            warn!(job_id = %job.id, kind = %job.kind, "[Worker] Dropping queued job");
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!("[Worker] Stopped with {} queued jobs not processed", abandoned);
        }
        info!("[Worker] Stopped.");
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

async fn run_worker(
    receiver: Receiver<Job>,
    handler: Arc<dyn JobHandler>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = receiver.recv() => match job {
                Ok(job) => job,
                Err(_) => {
                    info!("[Worker] Queue closed");
                    break;
                }
            },
        };

        // Not raced against `cancel`: a running job always completes.
        execute(handler.as_ref(), job).await;
    }
}

async fn execute(handler: &dyn JobHandler, job: Job) {
    let waited = OffsetDateTime::now_utc() - job.enqueued_at;
    info!(
        job_id = %job.id,
        kind = %job.kind,
        waited_ms = waited.whole_milliseconds() as i64,
        "[Worker] Processing job"
    );
    let started = Instant::now();

    match AssertUnwindSafe(handler.handle(&job)).catch_unwind().await {
        Ok(Ok(())) => info!(
            job_id = %job.id,
            kind = %job.kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "[Worker] Job completed"
        ),
        Ok(Err(e)) => error!(job_id = %job.id, kind = %job.kind, "[Worker] Job failed: {}", e),
        Err(panic) => error!(
            job_id = %job.id,
            kind = %job.kind,
            "[Worker] Job panicked: {}",
            panic_message(panic.as_ref())
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
