//! Wire format of the work queue and the notification queue.
//!
//! Both are flat camelCase JSON objects. Unknown fields are ignored so
//! producers can add fields without breaking older consumers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::model::VideoStatus;
use crate::common::clock::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    #[default]
    Process,
    Retry,
}

/// One processing request on the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
    pub video_id: Uuid,
    #[validate(length(min = 1))]
    pub object_name: String,
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub action: JobAction,
    /// Attempts already made when the message was produced.
    #[serde(default)]
    pub retry_count: u32,
}

impl WorkMessage {
    pub fn new(
        video_id: Uuid,
        object_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            video_id,
            object_name: object_name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            action: if retry_count > 0 { JobAction::Retry } else { JobAction::Process },
            retry_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub size_bytes: u64,
    pub low_res_size_bytes: u64,
    pub original_resolution: String,
    pub low_resolution: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub video_id: Uuid,
    pub status: VideoStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
}

fn done_status() -> VideoStatus {
    VideoStatus::Done
}

fn failed_status() -> VideoStatus {
    VideoStatus::Failed
}

fn full_progress() -> u8 {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub video_id: Uuid,
    #[serde(default = "done_status")]
    pub status: VideoStatus,
    #[serde(default = "full_progress")]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_res_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadata>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub video_id: Uuid,
    #[serde(default = "failed_status")]
    pub status: VideoStatus,
    #[serde(default)]
    pub progress: u8,
    pub error: String,
    pub timestamp: i64,
}

/// A status event on the notification queue, discriminated by `type`.
/// Unknown `type` values fail to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    Progress(ProgressUpdate),
    Complete(CompletionReport),
    Failed(FailureReport),
}

impl Notification {
    pub fn progress(video_id: Uuid, progress: u8) -> Self {
        Notification::Progress(ProgressUpdate {
            video_id,
            status: VideoStatus::Processing,
            progress: progress.min(100),
            error: None,
            timestamp: now_millis(),
        })
    }

    pub fn complete(video_id: Uuid, low_res_path: String, thumbnail_path: String, metadata: VideoMetadata) -> Self {
        Notification::Complete(CompletionReport {
            video_id,
            status: VideoStatus::Done,
            progress: 100,
            low_res_path: Some(low_res_path),
            thumbnail_path: Some(thumbnail_path),
            metadata: Some(metadata),
            timestamp: now_millis(),
        })
    }

    pub fn failed(video_id: Uuid, error: impl Into<String>) -> Self {
        Notification::Failed(FailureReport {
            video_id,
            status: VideoStatus::Failed,
            progress: 0,
            error: error.into(),
            timestamp: now_millis(),
        })
    }

    pub fn video_id(&self) -> Uuid {
        match self {
            Notification::Progress(p) => p.video_id,
            Notification::Complete(c) => c.video_id,
            Notification::Failed(f) => f.video_id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Notification::Progress(p) => p.timestamp,
            Notification::Complete(c) => c.timestamp,
            Notification::Failed(f) => f.timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Progress(_) => "progress",
            Notification::Complete(_) => "complete",
            Notification::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn work_message_reads_the_queue_format() {
        let id = Uuid::new_v4();
        let message: WorkMessage = serde_json::from_value(json!({
            "videoId": id,
            "objectName": "videos/abc/clip.mp4",
            "fileName": "clip.mp4",
            "contentType": "video/mp4",
            "action": "retry",
            "retryCount": 2,
            "priority": "high"
        }))
        .unwrap();

        assert_eq!(message.video_id, id);
        assert_eq!(message.action, JobAction::Retry);
        assert_eq!(message.retry_count, 2);
        assert!(message.validate().is_ok());
    }

    #[test]
    fn retry_count_defaults_to_zero() {
        let message: WorkMessage = serde_json::from_value(json!({
            "videoId": Uuid::nil(),
            "objectName": "videos/abc/clip.mp4",
            "fileName": "clip.mp4",
            "contentType": "video/mp4"
        }))
        .unwrap();

        assert_eq!(message.retry_count, 0);
        assert_eq!(message.action, JobAction::Process);
    }

    #[test]
    fn empty_object_name_fails_validation() {
        let message = WorkMessage::new(Uuid::nil(), "", "clip.mp4", "video/mp4", 0);
        assert!(message.validate().is_err());
    }

    #[test]
    fn action_follows_retry_count() {
        assert_eq!(WorkMessage::new(Uuid::nil(), "a", "a", "video/mp4", 0).action, JobAction::Process);
        assert_eq!(WorkMessage::new(Uuid::nil(), "a", "a", "video/mp4", 1).action, JobAction::Retry);
    }

    #[test]
    fn notifications_are_tagged_by_type() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(Notification::progress(id, 42)).unwrap();

        assert_eq!(value["type"], "progress");
        assert_eq!(value["videoId"], json!(id));
        assert_eq!(value["status"], "processing");
        assert_eq!(value["progress"], 42);
        assert!(value["timestamp"].as_i64().unwrap() > 0);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn completion_carries_terminal_status() {
        let value = serde_json::to_value(Notification::complete(
            Uuid::nil(),
            "videos/a/clip_low.mp4".into(),
            "videos/a/clip_thumb.webp".into(),
            VideoMetadata::default(),
        ))
        .unwrap();

        assert_eq!(value["type"], "complete");
        assert_eq!(value["status"], "done");
        assert_eq!(value["progress"], 100);
        assert_eq!(value["lowResPath"], "videos/a/clip_low.mp4");
        assert_eq!(value["metadata"]["lowResSizeBytes"], 0);
    }

    #[test]
    fn unknown_notification_types_are_rejected() {
        let result = serde_json::from_value::<Notification>(json!({
            "type": "paused",
            "videoId": Uuid::nil(),
            "timestamp": 1
        }));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_notification_fields_are_ignored() {
        let notification: Notification = serde_json::from_value(json!({
            "type": "failed",
            "videoId": Uuid::nil(),
            "status": "failed",
            "progress": 0,
            "error": "encode failed",
            "timestamp": 1700000000000i64,
            "hostname": "worker-3"
        }))
        .unwrap();

        assert_eq!(notification.kind(), "failed");
        assert!(matches!(&notification, Notification::Failed(f) if f.status == VideoStatus::Failed));
        assert_eq!(notification.timestamp(), 1_700_000_000_000);
    }
}
