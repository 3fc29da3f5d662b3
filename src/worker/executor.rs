//! Worker executor: claim, work, retire.
//!
//! One execution is a bounded sequence of store writes around the workload:
//!
//! 1. fetch the task (absent: nothing to do)
//! 2. claim it with `pending -> in_progress` (lost race: nothing to do)
//! 3. run the workload
//! 4. `in_progress -> done` on success
//! 5. `in_progress -> error` on any failure in 3 or 4
//!
//! Step 5 runs whenever step 2 succeeded, including when the workload
//! panics, so a claimed task never stays in progress after a failure.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span, debug, error, info, warn};

use super::Source;
use super::workload::Workload;
use crate::error::{Error, Result};
use crate::model::{DurationClass, Status, TaskId};
use crate::store::TaskStore;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_state_transition, start_task_span};
use opentelemetry::KeyValue;

/// How a single execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// Work ran and the task is `done`.
    Completed,
    /// Work failed and the task is `error`.
    Failed { error: String },
    /// The task was not pending (already claimed by another dispatcher or
    /// finished). Nothing was written.
    Skipped { current: Status },
    /// The task does not exist, or was deleted while in progress.
    Missing,
}

impl Execution {
    /// Whether the originating dispatch should be treated as handled.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Execution::Failed { .. })
    }
}

/// Runs tasks against the store. Cheap to share behind an `Arc`.
pub struct Executor {
    store: Arc<dyn TaskStore>,
    workload: Arc<dyn Workload>,
}

impl Executor {
    pub fn new(store: Arc<dyn TaskStore>, workload: Arc<dyn Workload>) -> Self {
        Self { store, workload }
    }

    /// Execute `id` with the given duration class.
    ///
    /// Per-task failures are reported as [`Execution::Failed`]; `Err` means
    /// the store itself failed and the outcome could not be recorded.
    pub async fn execute(
        &self,
        id: TaskId,
        class: DurationClass,
        source: Source,
    ) -> Result<Execution> {
        let span = start_task_span(id, class, source.as_str());
        self.run(id, class, &span).instrument(span.clone()).await
    }

    async fn run(&self, id: TaskId, class: DurationClass, span: &Span) -> Result<Execution> {
        let task = match self.store.get(id).await {
            Ok(task) => task,
            Err(Error::NotFound(_)) => {
                debug!("task no longer exists, dropping");
                return Ok(Execution::Missing);
            }
            Err(e) => return Err(e),
        };

        if task.status != Status::Pending {
            warn!(status = %task.status, "task already past pending, not dispatching again");
            return Ok(Execution::Skipped {
                current: task.status,
            });
        }

        match self
            .store
            .compare_and_set(id, Status::Pending, Status::InProgress)
            .await
        {
            Ok(true) => self.transitioned(span, Status::Pending, Status::InProgress),
            Ok(false) => {
                let Some(current) = self.current_status(id).await? else {
                    return Ok(Execution::Missing);
                };
                warn!(status = %current, "lost claim to another dispatcher");
                return Ok(Execution::Skipped { current });
            }
            Err(Error::NotFound(_)) => return Ok(Execution::Missing),
            Err(e) => return Err(e),
        }

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.workload.perform(&task, class))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::Execution(panic_message(panic))));

        let failure = match outcome {
            Ok(()) => match self
                .store
                .compare_and_set(id, Status::InProgress, Status::Done)
                .await
            {
                Ok(true) => {
                    self.transitioned(span, Status::InProgress, Status::Done);
                    record_duration(started, class, "done");
                    info!(name = %task.name, "task done");
                    return Ok(Execution::Completed);
                }
                Ok(false) => "status changed while in progress".to_string(),
                Err(Error::NotFound(_)) => {
                    debug!("task deleted while in progress, dropping");
                    return Ok(Execution::Missing);
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        record_duration(started, class, "error");
        self.fail(id, failure, span).await
    }

    /// Finalizer for a claimed task: record `in_progress -> error`.
    async fn fail(&self, id: TaskId, failure: String, span: &Span) -> Result<Execution> {
        warn!(error = %failure, "task failed");
        match self
            .store
            .compare_and_set(id, Status::InProgress, Status::Error)
            .await
        {
            Ok(true) => {
                self.transitioned(span, Status::InProgress, Status::Error);
                Ok(Execution::Failed { error: failure })
            }
            Ok(false) => {
                if let Some(current) = self.current_status(id).await? {
                    warn!(status = %current, "could not mark failed task as error");
                }
                Ok(Execution::Failed { error: failure })
            }
            Err(Error::NotFound(_)) => Ok(Execution::Missing),
            Err(e) => {
                error!(error = %e, "failed to record task error");
                Err(e)
            }
        }
    }

    async fn current_status(&self, id: TaskId) -> Result<Option<Status>> {
        match self.store.get(id).await {
            Ok(task) => Ok(Some(task.status)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn transitioned(&self, span: &Span, from: Status, to: Status) {
        record_state_transition(span, from.as_str(), to.as_str());
        metrics::task_state_transitions().add(
            1,
            &[
                KeyValue::new("from", from.as_str()),
                KeyValue::new("to", to.as_str()),
            ],
        );
    }
}

fn record_duration(started: Instant, class: DurationClass, result: &'static str) {
    metrics::task_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[
            KeyValue::new("class", class.to_string()),
            KeyValue::new("result", result),
        ],
    );
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("workload panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("workload panicked: {s}")
    } else {
        "workload panicked".to_string()
    }
}
