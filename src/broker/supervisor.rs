//! Broker connection supervisor.
//!
//! Owns the consumer's connection lifecycle: open a session, consume until
//! the connection fails, wait a fixed backoff, open again. There is no retry
//! limit; the loop only ends on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use super::Broker;
use crate::dispatch::Consumer;
use crate::shutdown;
use crate::telemetry::metrics;

pub struct Supervisor<B: Broker> {
    broker: B,
    consumer: Arc<Consumer>,
    backoff: Duration,
}

impl<B: Broker> Supervisor<B> {
    pub fn new(broker: B, consumer: Arc<Consumer>, backoff: Duration) -> Self {
        Self {
            broker,
            consumer,
            backoff,
        }
    }

    /// Run until shutdown. Connection failures are logged and retried after
    /// the backoff; they never end the loop.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let opened = tokio::select! {
                _ = shutdown::signalled(&mut stop) => break,
                opened = self.broker.open() => opened,
            };

            match opened {
                Ok(mut session) => {
                    info!(attempt, "broker session established");
                    attempt = 0;
                    match self.consumer.consume(&mut session, stop.clone()).await {
                        Ok(()) => {
                            if let Err(e) = self.broker.close(session).await {
                                warn!(error = %e, "error closing broker session");
                            }
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "broker connection lost");
                            drop(session);
                        }
                    }
                }
                Err(e) => {
                    error!(attempt, error = %e, "broker connection failed");
                }
            }

            metrics::broker_reconnects().add(1, &[]);
            info!(backoff_secs = self.backoff.as_secs_f64(), "reconnecting after backoff");
            tokio::select! {
                _ = shutdown::signalled(&mut stop) => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
        info!("broker supervisor stopped");
    }
}
