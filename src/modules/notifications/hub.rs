use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::modules::videos::model::{VideoRecord, VideoStatus};

/// Error text sent to live clients is cut to this many characters.
pub const MAX_LIVE_ERROR_CHARS: usize = 200;

/// What live subscribers see. Always built from the stored record, never from
/// the raw notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum LiveUpdate {
    #[serde(rename = "global-video-progress", rename_all = "camelCase")]
    Progress {
        video_id: Uuid,
        progress: i32,
        status: VideoStatus,
    },
    #[serde(rename = "global-video-completed", rename_all = "camelCase")]
    Completed {
        video_id: Uuid,
        low_res_path: Option<String>,
        thumbnail_path: Option<String>,
    },
    #[serde(rename = "global-video-failed", rename_all = "camelCase")]
    Failed { video_id: Uuid, error: String },
}

impl LiveUpdate {
    pub fn from_record(record: &VideoRecord) -> Self {
        match record.status() {
            VideoStatus::Done => LiveUpdate::Completed {
                video_id: record.id,
                low_res_path: record.low_res_path.clone(),
                thumbnail_path: record.thumbnail_path.clone(),
            },
            VideoStatus::Failed => LiveUpdate::Failed {
                video_id: record.id,
                error: truncate_chars(record.error.as_deref().unwrap_or("Unknown error"), MAX_LIVE_ERROR_CHARS),
            },
            status => LiveUpdate::Progress {
                video_id: record.id,
                progress: record.progress,
                status,
            },
        }
    }

    pub fn video_id(&self) -> Uuid {
        match self {
            LiveUpdate::Progress { video_id, .. }
            | LiveUpdate::Completed { video_id, .. }
            | LiveUpdate::Failed { video_id, .. } => *video_id,
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Fan-out of live updates to every connected client.
#[derive(Clone)]
pub struct LiveHub {
    tx: broadcast::Sender<LiveUpdate>,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many clients received the update.
    pub fn publish(&self, update: LiveUpdate) -> usize {
        // No receivers is not an error.
        self.tx.send(update).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: VideoStatus) -> VideoRecord {
        let mut record = VideoRecord::queued(Uuid::new_v4(), "clip.mp4", "videos/x/clip.mp4", "video/mp4");
        record.status = status.to_string();
        record
    }

    #[test]
    fn progress_event_mirrors_the_record() {
        let mut r = record(VideoStatus::Processing);
        r.progress = 55;

        let value = serde_json::to_value(LiveUpdate::from_record(&r)).unwrap();
        assert_eq!(value["event"], "global-video-progress");
        assert_eq!(value["progress"], 55);
        assert_eq!(value["status"], "processing");
        assert_eq!(value["videoId"], serde_json::json!(r.id));
    }

    #[test]
    fn failure_text_is_truncated_for_display_only() {
        let mut r = record(VideoStatus::Failed);
        r.error = Some("é".repeat(500));

        match LiveUpdate::from_record(&r) {
            LiveUpdate::Failed { error, .. } => assert_eq!(error.chars().count(), MAX_LIVE_ERROR_CHARS),
            other => panic!("unexpected update {:?}", other),
        }
        assert_eq!(r.error.as_ref().map(|e| e.chars().count()), Some(500));
    }

    #[test]
    fn publish_without_clients_is_fine() {
        let hub = LiveHub::new(8);
        assert_eq!(hub.publish(LiveUpdate::from_record(&record(VideoStatus::Done))), 0);

        let mut rx = hub.subscribe();
        let update = LiveUpdate::from_record(&record(VideoStatus::Done));
        assert_eq!(hub.publish(update.clone()), 1);
        assert_eq!(rx.try_recv().unwrap(), update);
    }
}
