//! Periodic scan for pending tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::model::{DurationClass, Status};
use crate::shutdown;
use crate::store::TaskStore;
use crate::worker::{Job, JobQueue, Source};

/// Scans the store on a fixed interval and queues every pending task.
///
/// Scans run inline in a single loop, so a slow scan delays the next tick
/// instead of overlapping it; missed ticks are skipped, not bunched.
pub struct Poller {
    store: Arc<dyn TaskStore>,
    queue: JobQueue,
    interval: Duration,
}

impl Poller {
    pub fn new(store: Arc<dyn TaskStore>, queue: JobQueue, interval: Duration) -> Self {
        Self {
            store,
            queue,
            interval,
        }
    }

    /// One scan: queue every pending task. Returns how many were newly queued.
    pub async fn scan(&self) -> Result<usize> {
        let pending = self.store.list_by_status(Status::Pending).await?;
        let found = pending.len();
        let queued = pending
            .into_iter()
            .filter(|task| {
                self.queue
                    .submit(Job::new(task.id, DurationClass::Normal, Source::Poller))
            })
            .count();
        if found > 0 {
            info!(found, queued, "pending scan dispatched tasks");
        } else {
            debug!("pending scan found nothing");
        }
        Ok(queued)
    }

    /// Scan every interval until shutdown. Scan errors are logged and the
    /// loop carries on with the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs_f64(), "poller started");

        loop {
            tokio::select! {
                _ = shutdown::signalled(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.scan().await {
                error!(error = %e, "pending scan failed");
            }
        }
        info!("poller stopped");
    }
}
