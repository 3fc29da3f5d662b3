//! Message broker plumbing: the delivery/session seams, the AMQP
//! implementation, the event publisher and the reconnecting supervisor.
//!
//! A broker session owns its connection. When the session is dropped (after
//! a failure or at shutdown) the connection goes with it; nothing holds a
//! connection at process scope.

pub mod amqp;
pub mod supervisor;

pub use amqp::{AmqpBroker, AmqpDelivery, AmqpSession, Publisher};
pub use supervisor::Supervisor;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// One received message, settled exactly once.
#[async_trait]
pub trait Acknowledge: Send + Sized {
    /// Raw message body.
    fn body(&self) -> &[u8];

    /// Positive acknowledgement: the broker forgets the message.
    async fn ack(self) -> Result<()>;

    /// Negative acknowledgement without requeue: the message is dropped.
    async fn reject(self) -> Result<()>;
}

/// Opens consumer sessions against the dispatch queue.
///
/// A session yields deliveries until the connection fails (an `Err` item,
/// or the end of the stream).
#[async_trait]
pub trait Broker: Send + Sync {
    type Delivery: Acknowledge + 'static;
    type Session: Stream<Item = Result<Self::Delivery>> + Send + Unpin;

    /// Connect, declare the queue and start consuming.
    async fn open(&self) -> Result<Self::Session>;

    /// Release a session that is still healthy.
    async fn close(&self, session: Self::Session) -> Result<()> {
        drop(session);
        Ok(())
    }
}
