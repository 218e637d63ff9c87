use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::infrastructure::queue::broker::{Broker, Topology};
use crate::modules::videos::events::Notification;

/// Destination of worker status events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

pub struct BrokerNotificationSink {
    broker: Arc<dyn Broker>,
    topology: Topology,
}

impl BrokerNotificationSink {
    pub fn new(broker: Arc<dyn Broker>, topology: Topology) -> Self {
        Self { broker, topology }
    }
}

#[async_trait]
impl NotificationSink for BrokerNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_vec(notification)?;
        self.broker.publish(&self.topology, &payload).await
    }
}

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort publisher: a failed or stalled send is logged and never
/// reaches the pipeline's own control flow.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    publish_timeout: Duration,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    /// Waits at most the publish timeout; the notice is dropped after that.
    pub async fn send(&self, notification: Notification) {
        let video_id = notification.video_id();
        match tokio::time::timeout(self.publish_timeout, self.sink.send(&notification)).await {
            Ok(Ok(())) => debug!(video_id = %video_id, kind = notification.kind(), "Notification published"),
            Ok(Err(e)) => warn!(
                video_id = %video_id,
                kind = notification.kind(),
                error = %e,
                "Failed to publish notification"
            ),
            Err(_) => warn!(
                video_id = %video_id,
                kind = notification.kind(),
                timeout_ms = self.publish_timeout.as_millis() as u64,
                "Notification publish timed out, dropping it"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use anyhow::anyhow;

    use super::*;
    use crate::modules::videos::events::ProgressUpdate;

    /// A sink whose publishes never complete, like a blackholed broker.
    pub struct StalledSink;

    #[async_trait]
    impl NotificationSink for StalledSink {
        async fn send(&self, _notification: &Notification) -> Result<()> {
            std::future::pending::<Result<()>>().await
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<Notification>>,
        pub fail: AtomicBool,
    }

    impl RecordingSink {
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }

        pub fn progress_values(&self) -> Vec<u8> {
            self.sent()
                .iter()
                .filter_map(|n| match n {
                    Notification::Progress(ProgressUpdate { progress, .. }) => Some(*progress),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, notification: &Notification) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("notification topic unavailable"));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use uuid::Uuid;

    use super::testing::{RecordingSink, StalledSink};
    use super::*;
    use crate::infrastructure::queue::listener::testing::MemoryBroker;

    #[tokio::test]
    async fn publish_failures_are_swallowed() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let notifier = Notifier::new(sink.clone());

        notifier.send(Notification::progress(Uuid::new_v4(), 10)).await;
        assert!(sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_publish_is_abandoned_after_the_timeout() {
        let notifier = Notifier::new(Arc::new(StalledSink)).with_timeout(Duration::from_millis(250));
        let started = tokio::time::Instant::now();

        notifier.send(Notification::progress(Uuid::new_v4(), 10)).await;

        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn broker_sink_publishes_json_to_the_notification_topic() {
        let broker = Arc::new(MemoryBroker::default());
        let topology = Topology::new("video-notifications", "video-notifications-subscription");
        let sink = BrokerNotificationSink::new(broker.clone(), topology.clone());
        let id = Uuid::new_v4();

        sink.send(&Notification::failed(id, "encode failed")).await.unwrap();

        let published = broker.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, topology);
        let decoded: Notification = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(decoded.video_id(), id);
        assert_eq!(decoded.kind(), "failed");
    }
}
