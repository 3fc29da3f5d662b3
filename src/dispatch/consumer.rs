//! Event-driven dispatch: one broker delivery at a time.
//!
//! Long-running tasks are handed to the job queue and acknowledged at once;
//! normal tasks run inline, blocking the consumer until they finish, and
//! are acknowledged or rejected by outcome. A bad event is rejected and the
//! loop moves on.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use opentelemetry::KeyValue;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broker::Acknowledge;
use crate::error::{Error, Result};
use crate::model::{DispatchEvent, DurationClass};
use crate::shutdown;
use crate::telemetry::metrics;
use crate::worker::{Executor, Job, JobQueue, Source};

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Negative acknowledgement, never requeued.
    Reject,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Reject => "reject",
        }
    }
}

pub struct Consumer {
    executor: Arc<Executor>,
    queue: JobQueue,
}

impl Consumer {
    pub fn new(executor: Arc<Executor>, queue: JobQueue) -> Self {
        Self { executor, queue }
    }

    /// Decide the fate of one message body. Never fails: every error is
    /// folded into a rejection.
    pub async fn handle(&self, body: &[u8]) -> Disposition {
        let event = match DispatchEvent::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "rejecting malformed dispatch event");
                return Disposition::Reject;
            }
        };

        match event.duration_class() {
            DurationClass::Long => {
                let job = Job::new(event.task_id, DurationClass::Long, Source::Consumer);
                if !self.queue.submit(job) {
                    debug!(task_id = %event.task_id, "long task already queued");
                }
                Disposition::Ack
            }
            DurationClass::Normal => {
                match self
                    .executor
                    .execute(event.task_id, DurationClass::Normal, Source::Consumer)
                    .await
                {
                    Ok(outcome) if outcome.is_settled() => {
                        debug!(task_id = %event.task_id, ?outcome, "inline execution settled");
                        Disposition::Ack
                    }
                    Ok(outcome) => {
                        warn!(task_id = %event.task_id, ?outcome, "inline execution failed");
                        Disposition::Reject
                    }
                    Err(e) => {
                        error!(task_id = %event.task_id, error = %e, "inline execution aborted");
                        Disposition::Reject
                    }
                }
            }
        }
    }

    /// Consume one session until it fails or shutdown is signalled.
    ///
    /// Returns `Ok(())` on shutdown. Any `Err` is connection-level: the
    /// stream failed or ended, or a settlement could not be sent. Shutdown is
    /// only observed between deliveries, so an inline execution is never
    /// abandoned halfway.
    pub async fn consume<S, D>(
        &self,
        deliveries: &mut S,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()>
    where
        S: Stream<Item = Result<D>> + Unpin,
        D: Acknowledge,
    {
        loop {
            let next = tokio::select! {
                _ = shutdown::signalled(&mut stop) => return Ok(()),
                next = deliveries.next() => next,
            };
            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return Err(e),
                None => return Err(Error::Connection("delivery stream ended".to_string())),
            };

            let disposition = self.handle(delivery.body()).await;
            let settled = match disposition {
                Disposition::Ack => delivery.ack().await,
                Disposition::Reject => delivery.reject().await,
            };
            settled.map_err(|e| Error::Connection(format!("settle delivery: {e}")))?;

            metrics::broker_deliveries()
                .add(1, &[KeyValue::new("disposition", disposition.as_str())]);
            info!(disposition = disposition.as_str(), "delivery settled");
        }
    }
}
