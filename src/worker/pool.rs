//! Asynchronous job queue and the worker pool that drains it.
//!
//! The queue is unordered and unbounded. A task id is held in the queue's
//! in-flight set from submission until its execution finishes, so repeated
//! submissions of the same task (two poll ticks, or a poll tick and a broker
//! event) collapse into one job.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Source;
use super::executor::{Execution, Executor};
use crate::model::{DurationClass, TaskId};
use crate::telemetry::metrics;

/// A request to execute one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub task_id: TaskId,
    pub class: DurationClass,
    pub source: Source,
}

impl Job {
    pub fn new(task_id: TaskId, class: DurationClass, source: Source) -> Self {
        Self {
            task_id,
            class,
            source,
        }
    }
}

/// Submission side of the job queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    in_flight: Arc<Mutex<HashSet<TaskId>>>,
}

impl JobQueue {
    /// Queue a job without waiting for it to run.
    ///
    /// Returns `false` if the task is already queued or executing, or if the
    /// pool has shut down.
    pub fn submit(&self, job: Job) -> bool {
        if !self.in_flight.lock().insert(job.task_id) {
            debug!(task_id = %job.task_id, "task already queued, skipping");
            return false;
        }
        if self.tx.send(job).is_err() {
            self.release(job.task_id);
            warn!(task_id = %job.task_id, "job queue closed, dropping submission");
            return false;
        }
        metrics::tasks_dispatched().add(
            1,
            &[
                KeyValue::new("source", job.source.as_str()),
                KeyValue::new("class", job.class.to_string()),
            ],
        );
        true
    }

    /// Whether `id` is queued or executing.
    pub fn contains(&self, id: TaskId) -> bool {
        self.in_flight.lock().contains(&id)
    }

    /// Number of jobs queued or executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn release(&self, id: TaskId) {
        self.in_flight.lock().remove(&id);
    }
}

/// Releases a task id from the in-flight set when dropped, so an execution
/// that unwinds still frees its slot.
struct InFlight<'a> {
    queue: &'a JobQueue,
    task_id: TaskId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.release(self.task_id);
    }
}

/// Worker group handle.
/// - `request_shutdown` (or dropping the handle) stops workers from taking new jobs
/// - `shutdown_and_join` also waits for in-flight executions to finish
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers sharing one queue.
    pub fn spawn(n: usize, executor: Arc<Executor>) -> (Self, JobQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = JobQueue {
            tx,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        };
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n.max(1))
            .map(|worker_id| {
                let executor = Arc::clone(&executor);
                let queue = queue.clone();
                let rx = Arc::clone(&rx);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, executor, queue, rx, shutdown_rx).await;
                })
            })
            .collect();

        info!(workers = n.max(1), "worker pool started");
        (Self { shutdown_tx, joins }, queue)
    }

    /// Stop taking new jobs. In-flight executions run to completion.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    executor: Arc<Executor>,
    queue: JobQueue,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let job = tokio::select! {
            changed = shutdown_rx.changed() => {
                // a dropped pool handle also stops the workers
                if changed.is_err() {
                    break;
                }
                continue;
            }
            job = async { rx.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        // Not raced against shutdown: a started execution always finishes.
        let result = {
            let _slot = InFlight {
                queue: &queue,
                task_id: job.task_id,
            };
            AssertUnwindSafe(executor.execute(job.task_id, job.class, job.source))
                .catch_unwind()
                .await
        };
        let Ok(result) = result else {
            error!(worker_id, task_id = %job.task_id, "execution panicked");
            continue;
        };

        match result {
            Ok(Execution::Failed { error }) => {
                warn!(worker_id, task_id = %job.task_id, %error, "job finished with task error");
            }
            Ok(outcome) => {
                debug!(worker_id, task_id = %job.task_id, ?outcome, "job finished");
            }
            Err(e) => {
                error!(worker_id, task_id = %job.task_id, error = %e, "job aborted by store failure");
            }
        }
    }
    debug!(worker_id, "worker stopped");
}
