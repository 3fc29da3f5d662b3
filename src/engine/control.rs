//! Control plane: runs the worker pool, the poller and the broker
//! supervisor side by side until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::broker::{Broker, Supervisor};
use crate::config::{Config, DispatchConfig};
use crate::dispatch::{Consumer, Poller};
use crate::shutdown::{self, Shutdown};
use crate::store::TaskStore;
use crate::worker::{Executor, SimulatedWork, WorkerPool, Workload};

/// Configuration for the control plane.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub dispatch: DispatchConfig,
    /// Wait between broker connection attempts.
    pub reconnect_backoff: Duration,
    /// Run the periodic pending scan.
    pub poller: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            reconnect_backoff: Duration::from_secs(10),
            poller: true,
        }
    }
}

impl ControlConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dispatch: config.dispatch.clone(),
            reconnect_backoff: config.broker.reconnect_backoff,
            poller: true,
        }
    }
}

/// The dispatch pipeline. Clones share the same shutdown signal.
#[derive(Clone)]
pub struct ControlPlane {
    store: Arc<dyn TaskStore>,
    workload: Arc<dyn Workload>,
    config: ControlConfig,
    shutdown: Shutdown,
}

impl ControlPlane {
    pub fn new(store: Arc<dyn TaskStore>, config: ControlConfig) -> Self {
        let workload = Arc::new(SimulatedWork::from_config(&config.dispatch));
        Self {
            store,
            workload,
            config,
            shutdown: Shutdown::new(),
        }
    }

    /// Replace the simulated workload.
    pub fn with_workload(mut self, workload: Arc<dyn Workload>) -> Self {
        self.workload = workload;
        self
    }

    /// Signal the control plane to shut down.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Run until shutdown. With `broker == None` only the poller dispatches.
    ///
    /// On shutdown the dispatchers stop first, then the worker pool drains:
    /// executions already started run to completion.
    pub async fn run<B>(&self, broker: Option<B>)
    where
        B: Broker + 'static,
    {
        let executor = Arc::new(Executor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.workload),
        ));
        let (pool, queue) = WorkerPool::spawn(self.config.dispatch.workers, Arc::clone(&executor));
        let mut loops = JoinSet::new();
        let consumer_enabled = broker.is_some();

        if self.config.poller {
            let poller = Poller::new(
                Arc::clone(&self.store),
                queue.clone(),
                self.config.dispatch.scan_interval,
            );
            let stop = self.shutdown.subscribe();
            loops.spawn(async move { poller.run(stop).await });
        }

        if let Some(broker) = broker {
            let consumer = Arc::new(Consumer::new(Arc::clone(&executor), queue.clone()));
            let supervisor = Supervisor::new(broker, consumer, self.config.reconnect_backoff);
            let stop = self.shutdown.subscribe();
            loops.spawn(async move { supervisor.run(stop).await });
        }

        info!(
            poller = self.config.poller,
            consumer = consumer_enabled,
            "control plane started"
        );

        shutdown::signalled(&mut self.shutdown.subscribe()).await;
        info!("control plane shutting down");

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "dispatch loop ended abnormally");
            }
        }
        pool.shutdown_and_join().await;
        info!("control plane stopped");
    }
}
