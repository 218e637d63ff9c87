//! Supervised queue subscription.
//!
//! A [`QueueListener`] owns one subscription and walks the states
//! `Stopped -> Active -> Reconnecting -> Active ...` until it is shut down.
//! Deliveries are handed to a [`MessageHandler`]; `Ok` acknowledges the
//! delivery, `Err` negatively acknowledges it so the broker redelivers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::broker::{Broker, InboundMessage, Topology};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Active,
    Reconnecting,
}

#[derive(Clone, Debug)]
pub struct ListenerOptions {
    pub topology: Topology,
    /// Maximum deliveries in flight; also used as the broker prefetch.
    pub concurrency: u16,
    pub reconnect_delay: Duration,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<()>;
}

pub struct QueueListener {
    broker: Arc<dyn Broker>,
    handler: Arc<dyn MessageHandler>,
    options: ListenerOptions,
    state: watch::Sender<ListenerState>,
}

impl QueueListener {
    pub fn new(
        broker: Arc<dyn Broker>,
        handler: Arc<dyn MessageHandler>,
        options: ListenerOptions,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Stopped);
        Self {
            broker,
            handler,
            options: ListenerOptions {
                concurrency: options.concurrency.max(1),
                ..options
            },
            state,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Runs until `shutdown` fires. Subscription failures never end the loop.
    pub async fn run(self, shutdown: CancellationToken) {
        let queue = self.options.topology.subscription.clone();

        loop {
            let session = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.listen_once() => result,
            };

            match session {
                Ok(()) => warn!(queue = %queue, "Subscription closed by broker"),
                Err(e) => error!(queue = %queue, error = %e, "Subscription error"),
            }

            self.state.send_replace(ListenerState::Reconnecting);
            info!(
                queue = %queue,
                delay_ms = self.options.reconnect_delay.as_millis() as u64,
                "Re-establishing listener"
            );

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.options.reconnect_delay) => {}
            }

            if let Err(e) = self.broker.reconnect().await {
                error!(queue = %queue, error = %e, "Reconnect failed, will retry");
            }
        }

        self.state.send_replace(ListenerState::Stopped);
        info!(queue = %queue, "Listener stopped");
    }

    async fn listen_once(&self) -> Result<()> {
        let topology = &self.options.topology;
        self.broker.ensure_topology(topology).await?;
        let deliveries = self
            .broker
            .subscribe(topology, self.options.concurrency)
            .await?;

        self.state.send_replace(ListenerState::Active);
        info!(queue = %topology.subscription, concurrency = self.options.concurrency, "🎧 Listening");

        deliveries
            .try_for_each_concurrent(Some(self.options.concurrency as usize), |message| async move {
                self.dispatch(message).await;
                Ok(())
            })
            .await
    }

    async fn dispatch(&self, message: InboundMessage) {
        let result = self.handler.handle(message.payload()).await;

        match result {
            Ok(()) => {
                if let Err(e) = message.ack().await {
                    error!(error = %e, "Failed to ack message");
                }
            }
            Err(e) => {
                warn!(error = %e, "Message handling failed, requesting redelivery");
                if let Err(e) = message.nack(true).await {
                    error!(error = %e, "Failed to nack message");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory broker used by the listener and worker tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use futures_util::{stream, StreamExt};

    use super::*;
    use crate::infrastructure::queue::broker::{Acknowledger, MessageStream};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Settlement {
        Ack(Vec<u8>),
        Nack(Vec<u8>, bool),
    }

    /// One scripted subscription: deliveries, then either an error or an
    /// open-ended stream.
    pub enum Session {
        Deliver(Vec<Vec<u8>>),
        DeliverThenFail(Vec<Vec<u8>>, String),
        RefuseSubscribe(String),
    }

    #[derive(Default)]
    pub struct MemoryBroker {
        sessions: Mutex<VecDeque<Session>>,
        pub published: Mutex<Vec<(Topology, Vec<u8>)>>,
        pub settlements: Arc<Mutex<Vec<Settlement>>>,
        pub subscribe_calls: AtomicUsize,
        pub reconnects: AtomicUsize,
        pub fail_publish: std::sync::atomic::AtomicBool,
    }

    impl MemoryBroker {
        pub fn scripted(sessions: Vec<Session>) -> Self {
            Self {
                sessions: Mutex::new(sessions.into()),
                ..Self::default()
            }
        }

        pub fn settlements(&self) -> Vec<Settlement> {
            self.settlements.lock().unwrap().clone()
        }
    }

    struct RecordingAcker {
        payload: Vec<u8>,
        log: Arc<Mutex<Vec<Settlement>>>,
    }

    #[async_trait]
    impl Acknowledger for RecordingAcker {
        async fn ack(self: Box<Self>) -> Result<()> {
            self.log.lock().unwrap().push(Settlement::Ack(self.payload));
            Ok(())
        }

        async fn nack(self: Box<Self>, requeue: bool) -> Result<()> {
            self.log.lock().unwrap().push(Settlement::Nack(self.payload, requeue));
            Ok(())
        }
    }

    #[async_trait]
    impl Broker for MemoryBroker {
        async fn ensure_topology(&self, _topology: &Topology) -> Result<()> {
            Ok(())
        }

        async fn publish(&self, topology: &Topology, payload: &[u8]) -> Result<()> {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(anyhow!("broker unreachable"));
            }
            self.published.lock().unwrap().push((topology.clone(), payload.to_vec()));
            Ok(())
        }

        async fn subscribe(&self, _topology: &Topology, _prefetch: u16) -> Result<MessageStream> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            let session = self.sessions.lock().unwrap().pop_front();
            let log = self.settlements.clone();
            let to_message = move |payload: Vec<u8>| {
                let acker = RecordingAcker {
                    payload: payload.clone(),
                    log: log.clone(),
                };
                Ok(InboundMessage::new(payload, Box::new(acker)))
            };

            match session {
                None => Ok(stream::pending().boxed()),
                Some(Session::Deliver(payloads)) => Ok(stream::iter(payloads.into_iter().map(to_message))
                    .chain(stream::pending())
                    .boxed()),
                Some(Session::DeliverThenFail(payloads, reason)) => {
                    Ok(stream::iter(payloads.into_iter().map(to_message))
                        .chain(stream::once(async move { Err(anyhow!(reason)) }))
                        .boxed())
                }
                Some(Session::RefuseSubscribe(reason)) => Err(anyhow!(reason)),
            }
        }

        async fn reconnect(&self) -> Result<()> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
