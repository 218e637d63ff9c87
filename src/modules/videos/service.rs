use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::RegisterVideoRequest;
use super::events::{FailureReport, WorkMessage};
use super::model::{VideoRecord, VideoStatus};
use super::repository::VideoStore;
use super::validation;
use crate::common::clock::now_millis;
use crate::modules::notifications::hub::LiveUpdate;
use crate::state::AppState;

pub enum EnqueueOutcome {
    Queued(WorkMessage),
    /// The upload failed its format check; carries the reason.
    Rejected(String),
}

pub struct VideoService;

impl VideoService {
    pub async fn register(state: &AppState, req: RegisterVideoRequest) -> Result<VideoRecord> {
        let content_type = req.content_type.unwrap_or_else(|| {
            mime_guess::from_path(&req.file_name)
                .first_or_octet_stream()
                .to_string()
        });

        let record = state
            .videos
            .create(&req.file_name, &req.object_name, &content_type)
            .await?;

        info!(video_id = %record.id, object = %record.original_path, "Registered video");
        Ok(record)
    }

    pub async fn get(state: &AppState, id: Uuid) -> Result<Option<VideoRecord>> {
        state.videos.find(id).await
    }

    /// Checks the uploaded object and publishes a work message for it.
    /// `None` if the record does not exist. A rejected upload is marked
    /// failed and never queued.
    pub async fn enqueue_processing(state: &AppState, id: Uuid) -> Result<Option<EnqueueOutcome>> {
        let Some(record) = state.videos.find(id).await? else {
            return Ok(None);
        };

        let verdict = validation::verify_upload(
            state.storage.as_ref(),
            &record.original_path,
            &record.original_file_name,
        )
        .await
        .with_context(|| format!("Failed to read upload of video {}", id))?;

        if let Err(rejection) = verdict {
            let reason = rejection.to_string();
            warn!(video_id = %id, reason = %reason, "Upload rejected, marking video failed");

            let report = FailureReport {
                video_id: id,
                status: VideoStatus::Failed,
                progress: 0,
                error: reason.clone(),
                timestamp: now_millis(),
            };
            if let Some(updated) = state.videos.apply_failure(&report).await? {
                state.hub.publish(LiveUpdate::from_record(&updated));
            }
            return Ok(Some(EnqueueOutcome::Rejected(reason)));
        }

        let message = WorkMessage::new(
            record.id,
            record.original_path,
            record.original_file_name,
            record.content_type,
            u32::try_from(record.retry_count).unwrap_or(0),
        );

        let payload = serde_json::to_vec(&message)?;
        state
            .broker
            .publish(&state.config.queues.work, &payload)
            .await
            .with_context(|| format!("Failed to queue video {} for processing", id))?;

        info!(video_id = %id, action = ?message.action, "Queued video for processing");
        Ok(Some(EnqueueOutcome::Queued(message)))
    }
}
