use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    message::Delivery, options::*, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties, ExchangeKind,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broker::{Acknowledger, Broker, InboundMessage, MessageStream, Topology};

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ");
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        info!("✅ Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;

        Ok(Self {
            url: url.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    /// Fanout exchange for the topic, durable queue for the subscription.
    async fn declare(channel: &Channel, topology: &Topology) -> Result<()> {
        channel
            .exchange_declare(
                &topology.topic,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare topic {}: {}", topology.topic, e))?;

        channel
            .queue_declare(
                &topology.subscription,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare subscription {}: {}", topology.subscription, e))?;

        channel
            .queue_bind(
                &topology.subscription,
                &topology.topic,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to bind {} to {}: {}", topology.subscription, topology.topic, e))?;

        Ok(())
    }

    async fn publish_internal(&self, topology: &Topology, payload: &[u8]) -> Result<()> {
        let channel = self.channel.lock().await;

        Self::declare(&channel, topology).await?;

        channel
            .basic_publish(
                &topology.topic,
                "",
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl Broker for RabbitMqService {
    async fn ensure_topology(&self, topology: &Topology) -> Result<()> {
        let channel = self.channel.lock().await;
        Self::declare(&channel, topology).await
    }

    async fn publish(&self, topology: &Topology, payload: &[u8]) -> Result<()> {
        if let Err(e) = self.publish_internal(topology, payload).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(topology, payload).await?;
        }

        Ok(())
    }

    async fn subscribe(&self, topology: &Topology, prefetch: u16) -> Result<MessageStream> {
        let channel = self.channel.lock().await.clone();
        Self::declare(&channel, topology).await?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;

        let consumer_tag = format!("{}-{}", topology.subscription, Uuid::new_v4().simple());
        let consumer = channel
            .basic_consume(
                &topology.subscription,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        debug!(consumer_tag = %consumer_tag, "Consumer registered");

        let deliveries = consumer.map(|delivery| {
            delivery
                .map(|mut delivery| {
                    let payload = std::mem::take(&mut delivery.data);
                    InboundMessage::new(payload, Box::new(RabbitDelivery(delivery)))
                })
                .map_err(|e| anyhow!("Consumer stream failed: {}", e))
        });

        Ok(deliveries.boxed())
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }
}

struct RabbitDelivery(Delivery);

/// `sent == false` means lapin skipped the frame: the delivery was already
/// settled or its channel is gone.
fn settled(result: lapin::Result<bool>, action: &str, delivery_tag: u64) -> Result<()> {
    let sent = result.map_err(|e| anyhow!("Failed to {} message: {}", action, e))?;
    if !sent {
        warn!(delivery_tag, "{} not sent, delivery was already settled", action);
    }
    Ok(())
}

#[async_trait]
impl Acknowledger for RabbitDelivery {
    async fn ack(self: Box<Self>) -> Result<()> {
        let result = self.0.ack(BasicAckOptions::default()).await;
        settled(result, "ack", self.0.delivery_tag)
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<()> {
        let result = self
            .0
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await;
        settled(result, "nack", self.0.delivery_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_settlement_is_not_an_error() {
        assert!(settled(Ok(true), "ack", 1).is_ok());
        assert!(settled(Ok(false), "nack", 2).is_ok());
    }
}
