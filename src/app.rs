use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::connect_to_db;
use crate::infrastructure::queue::broker::Broker;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::notifications::hub::LiveHub;
use crate::modules::notifications::relay::NotificationRelay;
use crate::modules::videos::repository::VideoRepository;
use crate::state::AppState;
use crate::workers::notification_consumer::start_notification_consumer;
use crate::workers::transcoder::start_transcoder_worker;

const LIVE_HUB_CAPACITY: usize = 256;

pub fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve(router: Router, port: u16, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")
}

/// Record-owning tier: HTTP API, live updates and the notification consumer.
pub async fn run_api(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow!("DATABASE_URL is required for the api role"))?;
    let pool = connect_to_db(&database_url).await?;
    info!("✅ Connected to Database");

    let broker: Arc<dyn Broker> = Arc::new(RabbitMqService::new(&config.queues.rabbitmq_url).await?);
    // Declared so upload-complete can publish before any worker has started.
    broker.ensure_topology(&config.queues.work).await?;

    let videos = VideoRepository::new(pool);
    let hub = LiveHub::new(LIVE_HUB_CAPACITY);

    let relay = NotificationRelay::new(Arc::new(videos.clone()), hub.clone());
    let consumer = tokio::spawn(start_notification_consumer(
        config.queues.clone(),
        broker.clone(),
        relay,
        shutdown.clone(),
    ));

    let port = config.server_port;
    let storage = Arc::new(StorageService::new(&config.storage));
    let state = AppState::new(config, videos, broker, storage, hub);
    let served = serve(create_app(state), port, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = consumer.await {
        error!(error = %e, "Notification consumer task failed");
    }
    served
}

/// Processing tier: work-queue listener plus a liveness endpoint.
pub async fn run_worker(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let broker: Arc<dyn Broker> = Arc::new(RabbitMqService::new(&config.queues.rabbitmq_url).await?);

    let health = tokio::spawn(serve(
        crate::routes::worker_routes().layer(TraceLayer::new_for_http()),
        config.server_port,
        shutdown.clone(),
    ));

    let worked = start_transcoder_worker(&config, broker, shutdown.clone()).await;

    shutdown.cancel();
    match health.await {
        Ok(Err(e)) => error!(error = %e, "Health server failed"),
        Err(e) => error!(error = %e, "Health server task failed"),
        Ok(Ok(())) => {}
    }
    worked
}
