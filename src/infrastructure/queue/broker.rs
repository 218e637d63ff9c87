//! Transport-neutral view of the message broker.
//!
//! A *topic* is what publishers write to; a *subscription* is the durable
//! queue attached to it that a listener drains. Both are created on demand so
//! a fresh deployment needs no provisioning step.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    pub topic: String,
    pub subscription: String,
}

impl Topology {
    pub fn new(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> Result<()>;
    async fn nack(self: Box<Self>, requeue: bool) -> Result<()>;
}

pub struct InboundMessage {
    payload: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl InboundMessage {
    pub fn new(payload: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self { payload, acker }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

/// Deliveries of one subscription session. An `Err` item means the session
/// is broken and the listener has to re-subscribe.
pub type MessageStream = BoxStream<'static, Result<InboundMessage>>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Create the topic and its subscription if they do not exist yet.
    async fn ensure_topology(&self, topology: &Topology) -> Result<()>;

    async fn publish(&self, topology: &Topology, payload: &[u8]) -> Result<()>;

    /// Start consuming the subscription with at most `prefetch` unacknowledged
    /// deliveries outstanding.
    async fn subscribe(&self, topology: &Topology, prefetch: u16) -> Result<MessageStream>;

    async fn reconnect(&self) -> Result<()>;
}
