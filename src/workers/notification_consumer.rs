//! Api-side consumer of the notification queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::settings::QueueSettings;
use crate::infrastructure::queue::broker::Broker;
use crate::infrastructure::queue::listener::{ListenerOptions, MessageHandler, QueueListener};
use crate::modules::notifications::relay::NotificationRelay;
use crate::modules::videos::events::Notification;

pub struct NotificationHandler {
    relay: NotificationRelay,
}

impl NotificationHandler {
    pub fn new(relay: NotificationRelay) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    async fn handle(&self, payload: &[u8]) -> Result<()> {
        let notification: Notification =
            serde_json::from_slice(payload).context("Malformed notification message")?;

        let outcome = self.relay.relay(&notification).await?;
        debug!(video_id = %notification.video_id(), outcome = ?outcome, "Notification relayed");
        Ok(())
    }
}

pub fn notification_listener(
    queues: &QueueSettings,
    broker: Arc<dyn Broker>,
    relay: NotificationRelay,
) -> QueueListener {
    QueueListener::new(
        broker,
        Arc::new(NotificationHandler::new(relay)),
        ListenerOptions {
            topology: queues.notifications.clone(),
            concurrency: queues.notification_prefetch,
            reconnect_delay: queues.reconnect_delay,
        },
    )
}

/// Runs the notification listener until shutdown.
pub async fn start_notification_consumer(
    queues: QueueSettings,
    broker: Arc<dyn Broker>,
    relay: NotificationRelay,
    shutdown: CancellationToken,
) {
    notification_listener(&queues, broker, relay).run(shutdown).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::infrastructure::queue::broker::Topology;
    use crate::infrastructure::queue::listener::ListenerState;
    use crate::infrastructure::queue::listener::testing::{MemoryBroker, Session, Settlement};
    use crate::modules::notifications::hub::{LiveHub, LiveUpdate};
    use crate::modules::videos::model::{VideoRecord, VideoStatus};
    use crate::modules::videos::repository::testing::MemoryVideoStore;

    fn relay_for(id: Uuid) -> (Arc<MemoryVideoStore>, LiveHub, NotificationRelay) {
        let store = Arc::new(MemoryVideoStore::with([VideoRecord::queued(
            id,
            "clip.mp4",
            "videos/clip.mp4",
            "video/mp4",
        )]));
        let hub = LiveHub::new(16);
        let relay = NotificationRelay::new(store.clone(), hub.clone());
        (store, hub, relay)
    }

    #[tokio::test]
    async fn malformed_payloads_are_rejected() {
        let (_, _, relay) = relay_for(Uuid::new_v4());
        let handler = NotificationHandler::new(relay);

        assert!(handler.handle(b"garbage").await.is_err());
        let unknown_type = serde_json::json!({"type": "paused", "videoId": Uuid::new_v4(), "timestamp": 1});
        assert!(handler.handle(unknown_type.to_string().as_bytes()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_videos_are_acknowledged() {
        let (_, _, relay) = relay_for(Uuid::new_v4());
        let handler = NotificationHandler::new(relay);

        let payload = serde_json::to_vec(&Notification::progress(Uuid::new_v4(), 10)).unwrap();
        assert!(handler.handle(&payload).await.is_ok());
    }

    #[tokio::test]
    async fn listener_applies_and_settles_deliveries() {
        let id = Uuid::new_v4();
        let (store, hub, relay) = relay_for(id);
        let mut live = hub.subscribe();

        let good = serde_json::to_vec(&Notification::progress(id, 40)).unwrap();
        let bad = b"{".to_vec();
        let broker = Arc::new(MemoryBroker::scripted(vec![Session::Deliver(vec![good.clone(), bad.clone()])]));

        let queues = QueueSettings {
            rabbitmq_url: "amqp://localhost".into(),
            work: Topology::new("video-processing", "video-processing-subscription"),
            notifications: Topology::new("video-notifications", "video-notifications-subscription"),
            notification_prefetch: 1,
            notification_publish_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_millis(10),
        };

        let listener = notification_listener(&queues, broker.clone(), relay);
        let state = listener.state();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(listener.run(shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.settlements().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*state.borrow(), ListenerState::Active);
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(
            broker.settlements(),
            vec![Settlement::Ack(good), Settlement::Nack(bad, true)]
        );
        let record = store.get(id).unwrap();
        assert_eq!(record.progress, 40);
        assert_eq!(record.status(), VideoStatus::Processing);
        assert!(matches!(live.try_recv().unwrap(), LiveUpdate::Progress { progress: 40, .. }));
    }
}
