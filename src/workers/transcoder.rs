//! Work-queue consumer: orphan check, bounded in-place retries, terminal
//! failure reporting.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use validator::Validate;

use super::notifier::{BrokerNotificationSink, Notifier};
use super::pipeline::{PipelineSettings, TranscodePipeline, Transcoder};
use crate::config::settings::{AppConfig, OrphanCheckPolicy};
use crate::infrastructure::http::record_client::{RecordApiClient, RecordLookup, RecordPresence};
use crate::infrastructure::media::ffmpeg::Ffmpeg;
use crate::infrastructure::queue::broker::Broker;
use crate::infrastructure::queue::listener::{ListenerOptions, MessageHandler, QueueListener};
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::videos::events::{Notification, WorkMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// `base * 2^(attempt - 1)`, saturating.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The video no longer exists; nothing was done.
    Orphaned,
    /// Existence could not be confirmed under a fail-closed policy.
    Skipped,
    Completed { attempts: u32 },
    GaveUp { attempts: u32 },
}

pub struct JobController {
    records: Arc<dyn RecordLookup>,
    transcoder: Arc<dyn Transcoder>,
    notifier: Notifier,
    policy: RetryPolicy,
    orphan_policy: OrphanCheckPolicy,
}

impl JobController {
    pub fn new(
        records: Arc<dyn RecordLookup>,
        transcoder: Arc<dyn Transcoder>,
        notifier: Notifier,
        policy: RetryPolicy,
        orphan_policy: OrphanCheckPolicy,
    ) -> Self {
        Self {
            records,
            transcoder,
            notifier,
            policy,
            orphan_policy,
        }
    }

    pub async fn run(&self, job: &WorkMessage) -> JobOutcome {
        let video_id = job.video_id;

        match self.records.presence(video_id).await {
            RecordPresence::Present => {}
            RecordPresence::Absent => {
                info!(video_id = %video_id, "Video no longer exists, discarding job");
                return JobOutcome::Orphaned;
            }
            RecordPresence::Unknown(reason) => match self.orphan_policy {
                OrphanCheckPolicy::FailOpen => {
                    warn!(video_id = %video_id, reason = %reason, "Existence check failed, processing anyway");
                }
                OrphanCheckPolicy::FailClosed => {
                    error!(video_id = %video_id, reason = %reason, "Existence check failed, skipping job");
                    return JobOutcome::Skipped;
                }
            },
        }

        // A message that already carries more than `max_retries` attempts
        // still gets one attempt here before the failure is reported.
        let mut attempt = job.retry_count;
        let mut attempts = 0;

        loop {
            attempts += 1;
            info!(video_id = %video_id, attempt, action = ?job.action, "🎬 Processing video");

            let error = match self.transcoder.process(job).await {
                Ok(_) => {
                    info!(video_id = %video_id, attempts, "✅ Video processed");
                    return JobOutcome::Completed { attempts };
                }
                Err(e) => e,
            };

            attempt = attempt.saturating_add(1);
            if attempt > self.policy.max_retries {
                error!(video_id = %video_id, attempts, error = %error, "❌ Giving up on video");
                self.notifier.send(Notification::failed(video_id, error.to_string())).await;
                return JobOutcome::GaveUp { attempts };
            }

            let delay = self.policy.backoff_for(attempt);
            warn!(
                video_id = %video_id,
                attempt,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Processing failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Parses work messages and hands them to the controller. A malformed
/// payload is the only error returned, so it alone is redelivered.
pub struct WorkQueueHandler {
    controller: JobController,
}

impl WorkQueueHandler {
    pub fn new(controller: JobController) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl MessageHandler for WorkQueueHandler {
    async fn handle(&self, payload: &[u8]) -> Result<()> {
        let job: WorkMessage = serde_json::from_slice(payload).context("Malformed work message")?;
        job.validate().context("Invalid work message")?;

        let outcome = self.controller.run(&job).await;
        info!(video_id = %job.video_id, outcome = ?outcome, "Job settled");
        Ok(())
    }
}

/// Wires the worker tier and runs the work-queue listener until shutdown.
pub async fn start_transcoder_worker(
    config: &AppConfig,
    broker: Arc<dyn Broker>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("🎥 Starting Transcoder Worker...");

    let worker = &config.worker;
    let notifier = Notifier::new(Arc::new(BrokerNotificationSink::new(
        broker.clone(),
        config.queues.notifications.clone(),
    )))
    .with_timeout(config.queues.notification_publish_timeout);

    let pipeline = TranscodePipeline::new(
        Arc::new(StorageService::new(&config.storage)),
        Arc::new(Ffmpeg::new(worker.ffmpeg_preset.clone(), worker.ffmpeg_threads)),
        notifier.clone(),
        PipelineSettings {
            work_root: worker.work_dir.clone(),
            max_bitrate_kbps: worker.ffmpeg_max_bitrate_kbps,
        },
    );

    let records = RecordApiClient::new(&worker.server_base_url, worker.orphan_check_timeout)?;

    let controller = JobController::new(
        Arc::new(records),
        Arc::new(pipeline),
        notifier,
        RetryPolicy {
            max_retries: worker.max_retry_attempts,
            base_backoff: worker.retry_backoff,
        },
        worker.orphan_check_policy,
    );

    // The notification topology is declared up front so progress published
    // before the api tier starts is not dropped by the exchange.
    broker.ensure_topology(&config.queues.notifications).await?;

    let listener = QueueListener::new(
        broker,
        Arc::new(WorkQueueHandler::new(controller)),
        ListenerOptions {
            topology: config.queues.work.clone(),
            concurrency: 1,
            reconnect_delay: config.queues.reconnect_delay,
        },
    );
    listener.run(shutdown).await;

    Ok(())
}
