use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::guard;
use super::hub::{LiveHub, LiveUpdate};
use crate::modules::videos::events::Notification;
use crate::modules::videos::model::VideoRecord;
use crate::modules::videos::repository::VideoStore;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// The record was updated; carries the stored result.
    Applied(VideoRecord),
    /// A progress update older than the stored one; carries the unchanged record.
    Stale(VideoRecord),
    /// No record for the video, nothing written.
    Missing,
}

/// Applies notifications to the record store and fans the resulting record
/// state out to live clients.
#[derive(Clone)]
pub struct NotificationRelay {
    store: Arc<dyn VideoStore>,
    hub: LiveHub,
}

impl NotificationRelay {
    pub fn new(store: Arc<dyn VideoStore>, hub: LiveHub) -> Self {
        Self { store, hub }
    }

    pub async fn relay(&self, notification: &Notification) -> Result<RelayOutcome> {
        let video_id = notification.video_id();

        let Some(current) = self.store.find(video_id).await? else {
            warn!(video_id = %video_id, kind = notification.kind(), "Video not found, skipping notification");
            return Ok(RelayOutcome::Missing);
        };

        let outcome = match notification {
            Notification::Progress(update) => {
                if !guard::accepts(current.last_progress_update, update.timestamp) {
                    RelayOutcome::Stale(current)
                } else {
                    match self.store.apply_progress(update).await? {
                        Some(record) => RelayOutcome::Applied(record),
                        // Lost a race with a newer update, or the record went away.
                        None => match self.store.find(video_id).await? {
                            Some(record) => RelayOutcome::Stale(record),
                            None => RelayOutcome::Missing,
                        },
                    }
                }
            }
            Notification::Complete(report) => match self.store.apply_completion(report).await? {
                Some(record) => RelayOutcome::Applied(record),
                None => RelayOutcome::Missing,
            },
            Notification::Failed(report) => match self.store.apply_failure(report).await? {
                Some(record) => RelayOutcome::Applied(record),
                None => RelayOutcome::Missing,
            },
        };

        match &outcome {
            RelayOutcome::Applied(record) => {
                debug!(video_id = %video_id, kind = notification.kind(), status = %record.status, progress = record.progress, "Notification applied");
                if record.status().is_terminal() {
                    info!(video_id = %video_id, status = %record.status, "Video reached terminal state");
                }
                self.fan_out(record);
            }
            RelayOutcome::Stale(record) => {
                warn!(
                    video_id = %video_id,
                    timestamp = notification.timestamp(),
                    last_applied = ?record.last_progress_update,
                    "Progress update ignored, timestamp is not newer than current"
                );
                self.fan_out(record);
            }
            RelayOutcome::Missing => {
                warn!(video_id = %video_id, kind = notification.kind(), "Video disappeared while applying notification");
            }
        }

        Ok(outcome)
    }

    fn fan_out(&self, record: &VideoRecord) {
        let receivers = self.hub.publish(LiveUpdate::from_record(record));
        debug!(video_id = %record.id, receivers, "Live update sent");
    }
}
