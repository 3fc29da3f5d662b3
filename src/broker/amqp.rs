//! AMQP 0.9.1 (RabbitMQ) broker via `lapin`.
//!
//! - one durable queue, published to through the default exchange
//! - persistent delivery mode, JSON bodies
//! - manual acknowledgement with a prefetch limit
//! - rejections never requeue

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info};

use super::{Acknowledge, Broker};
use crate::config::BrokerConfig;
use crate::config::secrets::{ExposeSecret, redact_url};
use crate::error::{Error, Result};
use crate::model::DispatchEvent;

const CONSUMER_TAG: &str = "taskq-dispatch";
const REPLY_SUCCESS: u16 = 200;

/// Connect and open a channel, mapping failures to connection errors.
async fn open_channel(
    config: &BrokerConfig,
    connection_name: &str,
) -> Result<(Connection, Channel)> {
    let connection = Connection::connect(
        config.url.expose_secret(),
        ConnectionProperties::default().with_connection_name(connection_name.into()),
    )
    .await
    .map_err(|e| Error::Connection(format!("connect to {}: {e}", redact_url(&config.url))))?;

    let channel = connection
        .create_channel()
        .await
        .map_err(|e| Error::Connection(format!("channel creation failed: {e}")))?;

    Ok((connection, channel))
}

/// Declare the durable dispatch queue. Idempotent.
async fn declare_queue(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Consumer side
// ---------------------------------------------------------------------------

pub struct AmqpBroker {
    config: BrokerConfig,
}

impl AmqpBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

/// A live consumer session. Owns the connection it reads from.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    deliveries: BoxStream<'static, Result<AmqpDelivery>>,
}

// No field is structurally pinned.
impl Unpin for AmqpSession {}

impl Stream for AmqpSession {
    type Item = Result<AmqpDelivery>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.deliveries.poll_next_unpin(cx)
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    type Delivery = AmqpDelivery;
    type Session = AmqpSession;

    async fn open(&self) -> Result<AmqpSession> {
        let (connection, channel) = open_channel(&self.config, "taskq-consumer").await?;

        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;
        declare_queue(&channel, &self.config.queue).await?;

        let consumer = channel
            .basic_consume(
                &self.config.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            url = %redact_url(&self.config.url),
            queue = %self.config.queue,
            prefetch = self.config.prefetch,
            "consuming dispatch queue"
        );

        let deliveries = consumer
            .map(|delivery| delivery.map(AmqpDelivery).map_err(Error::from))
            .boxed();

        Ok(AmqpSession {
            connection,
            channel,
            deliveries,
        })
    }

    async fn close(&self, session: AmqpSession) -> Result<()> {
        session.channel.close(REPLY_SUCCESS, "shutdown").await?;
        session.connection.close(REPLY_SUCCESS, "shutdown").await?;
        debug!("consumer session closed");
        Ok(())
    }
}

/// A delivery received from the dispatch queue.
pub struct AmqpDelivery(lapin::message::Delivery);

#[async_trait]
impl Acknowledge for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.0.data
    }

    async fn ack(self) -> Result<()> {
        self.0.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(self) -> Result<()> {
        self.0
            .acker
            .nack(BasicNackOptions {
                requeue: false,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Publishes dispatch events. Used by task producers; the consumer never
/// publishes.
pub struct Publisher {
    connection: Connection,
    channel: Channel,
    queue: String,
}

impl Publisher {
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let (connection, channel) = open_channel(config, "taskq-publisher").await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        declare_queue(&channel, &config.queue).await?;
        Ok(Self {
            connection,
            channel,
            queue: config.queue.clone(),
        })
    }

    /// Publish one event as a persistent JSON message and wait for the
    /// broker's confirm.
    pub async fn publish(&self, event: &DispatchEvent) -> Result<()> {
        let body = event.to_vec()?;
        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await?;
        if confirm.await?.is_nack() {
            return Err(Error::Connection(format!(
                "broker refused event for task {}",
                event.task_id
            )));
        }
        debug!(task_id = %event.task_id, queue = %self.queue, "dispatch event published");
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.channel.close(REPLY_SUCCESS, "done").await?;
        self.connection.close(REPLY_SUCCESS, "done").await?;
        Ok(())
    }
}
