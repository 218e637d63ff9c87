use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Queued => "queued",
            VideoStatus::Processing => "processing",
            VideoStatus::Done => "done",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Done | VideoStatus::Failed)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for VideoStatus {
    fn from(s: &str) -> Self {
        match s {
            "processing" => VideoStatus::Processing,
            "done" => VideoStatus::Done,
            "failed" => VideoStatus::Failed,
            _ => VideoStatus::Queued,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: Uuid,
    pub original_file_name: String,
    pub original_path: String,
    pub content_type: String,
    pub status: String, // Stored as string in DB
    pub progress: i32,
    /// Full error text; only live updates are truncated.
    pub error: Option<String>,
    pub retry_count: i32,
    /// Epoch millis of the last applied notification.
    pub last_progress_update: Option<i64>,
    pub low_res_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub low_res_size_bytes: Option<i64>,
    pub original_resolution: Option<String>,
    pub low_resolution: Option<String>,
    pub duration_seconds: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

impl VideoRecord {
    pub fn status(&self) -> VideoStatus {
        VideoStatus::from(self.status.as_str())
    }

    /// A record straight after registration, before any notification.
    pub fn queued(id: Uuid, original_file_name: &str, original_path: &str, content_type: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            original_file_name: original_file_name.to_string(),
            original_path: original_path.to_string(),
            content_type: content_type.to_string(),
            status: VideoStatus::Queued.to_string(),
            progress: 0,
            error: None,
            retry_count: 0,
            last_progress_update: None,
            low_res_path: None,
            thumbnail_path: None,
            size_bytes: None,
            low_res_size_bytes: None,
            original_resolution: None,
            low_resolution: None,
            duration_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_column_text() {
        for status in [VideoStatus::Queued, VideoStatus::Processing, VideoStatus::Done, VideoStatus::Failed] {
            assert_eq!(VideoStatus::from(status.as_str()), status);
        }
        assert_eq!(VideoStatus::from("garbage"), VideoStatus::Queued);
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(VideoStatus::Done.is_terminal());
        assert!(VideoStatus::Failed.is_terminal());
        assert!(!VideoStatus::Processing.is_terminal());
        assert!(!VideoStatus::Queued.is_terminal());
    }
}
