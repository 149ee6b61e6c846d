//! Task delivery: a bounded queue feeding a pool of worker loops.
//!
//! Retry policy lives here, not in the pipeline. Each delivery attempt
//! is a full pipeline run; transient failures are retried with backoff
//! up to `max_attempts`, everything else dead-letters immediately.
//! Two time limits apply per task: the soft limit fails the current
//! attempt gracefully, the hard limit abandons the task outright.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::{IngestPipeline, IngestTask};
use crate::error::PipelineError;
use crate::models::PipelineConfig;
use crate::utils::{RetryConfig, RetryResult, with_retry};

/// The receiving side of the queue is gone; no more tasks can be queued.
#[derive(Debug, Error)]
#[error("task queue is closed")]
pub struct DispatchError;

/// Sending half of the task queue. Cheap to clone.
///
/// The queue closes once every dispatcher and the pool itself are
/// dropped; dispatching after that point fails.
#[derive(Clone)]
pub struct TaskDispatcher {
    tx: flume::Sender<IngestTask>,
}

impl TaskDispatcher {
    /// Queue a task, waiting while the queue is at capacity.
    pub async fn dispatch(&self, task: IngestTask) -> Result<(), DispatchError> {
        self.tx.send_async(task).await.map_err(|_| DispatchError)
    }
}

/// A fixed-size pool of workers draining the task queue.
pub struct IngestWorkerPool {
    tx: flume::Sender<IngestTask>,
    handles: Vec<JoinHandle<()>>,
}

impl IngestWorkerPool {
    /// Spawn `config.workers` worker loops over a bounded queue.
    pub fn start(pipeline: Arc<IngestPipeline>, config: &PipelineConfig) -> Self {
        let (tx, rx) = flume::bounded::<IngestTask>(config.queue_capacity);

        let handles = (0..config.workers.max(1))
            .map(|worker_id| {
                let rx = rx.clone();
                let pipeline = Arc::clone(&pipeline);
                let config = config.clone();
                tokio::spawn(async move {
                    while let Ok(task) = rx.recv_async().await {
                        process_task(worker_id, &pipeline, &config, task).await;
                    }
                })
            })
            .collect();

        Self { tx, handles }
    }

    pub fn dispatcher(&self) -> TaskDispatcher {
        TaskDispatcher {
            tx: self.tx.clone(),
        }
    }

    /// Close the queue and wait for in-flight tasks to drain.
    ///
    /// Outstanding `TaskDispatcher` clones keep the queue open; drop
    /// them first or the workers never exit.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker exited abnormally");
            }
        }
    }
}

async fn process_task(
    worker_id: usize,
    pipeline: &Arc<IngestPipeline>,
    config: &PipelineConfig,
    task: IngestTask,
) {
    let task = Arc::new(task);
    let document_id = task.document_id;
    let soft_secs = config.soft_time_limit_secs;
    let hard_limit = Duration::from_secs(config.hard_time_limit_secs);
    let retry_config = RetryConfig::new(config.max_attempts);

    let attempts = with_retry(&retry_config, || {
        let pipeline = Arc::clone(pipeline);
        let task = Arc::clone(&task);
        async move {
            match timeout(Duration::from_secs(soft_secs), pipeline.run(&task)).await {
                Ok(result) => result.map(|report| report.chunks_created),
                Err(_) => {
                    // The run never observed the failure: its future was
                    // dropped mid-stage, so compensation and the terminal
                    // status write both happen here
                    let err = PipelineError::TimeLimit(soft_secs);
                    pipeline
                        .abort_best_effort(task.document_id, &err.to_string())
                        .await;
                    Err(err)
                }
            }
        }
    });

    match timeout(hard_limit, attempts).await {
        Ok(RetryResult::Success(chunks)) => {
            info!(worker_id, document_id = %document_id, chunks, "task complete");
        }
        Ok(RetryResult::Failed {
            last_error,
            attempts,
        }) => {
            error!(
                worker_id,
                document_id = %document_id,
                attempts,
                error = %last_error,
                "task dead-lettered"
            );
        }
        Err(_) => {
            let err = PipelineError::TimeLimit(config.hard_time_limit_secs);
            pipeline.abort_best_effort(document_id, &err.to_string()).await;
            error!(
                worker_id,
                document_id = %document_id,
                limit_secs = config.hard_time_limit_secs,
                "task abandoned at hard time limit"
            );
        }
    }

    // The delivery is over either way; drop the progress entry
    pipeline.progress().forget(document_id);
}
