use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::events::{CompletionReport, FailureReport, ProgressUpdate};
use super::model::{VideoRecord, VideoStatus};
use crate::infrastructure::db::pool::DbPool;

/// Record-store operations used by the notification relay.
///
/// Every `apply_*` returns the record as stored after the call, or `None`
/// when nothing was written (missing record, or a stale progress update).
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<VideoRecord>>;

    /// Writes only when `update.timestamp` is strictly newer than the stored
    /// `last_progress_update`, or nothing is stored yet.
    async fn apply_progress(&self, update: &ProgressUpdate) -> Result<Option<VideoRecord>>;

    async fn apply_completion(&self, report: &CompletionReport) -> Result<Option<VideoRecord>>;

    async fn apply_failure(&self, report: &FailureReport) -> Result<Option<VideoRecord>>;
}

#[derive(Clone)]
pub struct VideoRepository {
    pool: DbPool,
}

impl VideoRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        original_file_name: &str,
        original_path: &str,
        content_type: &str,
    ) -> Result<VideoRecord> {
        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            INSERT INTO videos (original_file_name, original_path, content_type, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(original_file_name)
        .bind(original_path)
        .bind(content_type)
        .bind(VideoStatus::Queued.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn find(&self, id: Uuid) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>("SELECT * FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn apply_progress(&self, update: &ProgressUpdate) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            UPDATE videos
            SET status = $2,
                progress = $3,
                error = COALESCE($4, error),
                last_progress_update = $5,
                updated_at = NOW()
            WHERE id = $1
              AND (last_progress_update IS NULL OR last_progress_update < $5)
            RETURNING *
            "#,
        )
        .bind(update.video_id)
        .bind(update.status.as_str())
        .bind(i32::from(update.progress.min(100)))
        .bind(update.error.as_deref())
        .bind(update.timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn apply_completion(&self, report: &CompletionReport) -> Result<Option<VideoRecord>> {
        let metadata = report.metadata.as_ref();

        // GREATEST skips NULLs, so an unset timestamp takes the report's.
        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            UPDATE videos
            SET status = $2,
                progress = 100,
                error = NULL,
                low_res_path = COALESCE($3, low_res_path),
                thumbnail_path = COALESCE($4, thumbnail_path),
                size_bytes = COALESCE($5, size_bytes),
                low_res_size_bytes = COALESCE($6, low_res_size_bytes),
                original_resolution = COALESCE($7, original_resolution),
                low_resolution = COALESCE($8, low_resolution),
                duration_seconds = COALESCE($9, duration_seconds),
                last_progress_update = GREATEST(last_progress_update, $10),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(report.video_id)
        .bind(VideoStatus::Done.as_str())
        .bind(report.low_res_path.as_deref())
        .bind(report.thumbnail_path.as_deref())
        .bind(metadata.map(|m| clamp_i64(m.size_bytes)))
        .bind(metadata.map(|m| clamp_i64(m.low_res_size_bytes)))
        .bind(metadata.map(|m| m.original_resolution.clone()))
        .bind(metadata.map(|m| m.low_resolution.clone()))
        .bind(metadata.map(|m| m.duration_seconds))
        .bind(report.timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn apply_failure(&self, report: &FailureReport) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            UPDATE videos
            SET status = $2,
                progress = 0,
                error = $3,
                last_progress_update = GREATEST(last_progress_update, $4),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(report.video_id)
        .bind(VideoStatus::Failed.as_str())
        .bind(&report.error)
        .bind(report.timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store mirroring the SQL guards above.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::modules::notifications::guard::accepts;

    #[derive(Default)]
    pub struct MemoryVideoStore {
        records: Mutex<HashMap<Uuid, VideoRecord>>,
    }

    impl MemoryVideoStore {
        pub fn with(records: impl IntoIterator<Item = VideoRecord>) -> Self {
            Self {
                records: Mutex::new(records.into_iter().map(|r| (r.id, r)).collect()),
            }
        }

        pub fn get(&self, id: Uuid) -> Option<VideoRecord> {
            self.records.lock().unwrap().get(&id).cloned()
        }

        pub fn remove(&self, id: Uuid) {
            self.records.lock().unwrap().remove(&id);
        }
    }

    #[async_trait]
    impl VideoStore for MemoryVideoStore {
        async fn find(&self, id: Uuid) -> Result<Option<VideoRecord>> {
            Ok(self.get(id))
        }

        async fn apply_progress(&self, update: &ProgressUpdate) -> Result<Option<VideoRecord>> {
            let mut records = self.records.lock().unwrap();
            let Some(record) = records.get_mut(&update.video_id) else {
                return Ok(None);
            };
            if !accepts(record.last_progress_update, update.timestamp) {
                return Ok(None);
            }
            record.status = update.status.to_string();
            record.progress = i32::from(update.progress.min(100));
            if let Some(error) = &update.error {
                record.error = Some(error.clone());
            }
            record.last_progress_update = Some(update.timestamp);
            Ok(Some(record.clone()))
        }

        async fn apply_completion(&self, report: &CompletionReport) -> Result<Option<VideoRecord>> {
            let mut records = self.records.lock().unwrap();
            let Some(record) = records.get_mut(&report.video_id) else {
                return Ok(None);
            };
            record.status = VideoStatus::Done.to_string();
            record.progress = 100;
            record.error = None;
            if let Some(path) = &report.low_res_path {
                record.low_res_path = Some(path.clone());
            }
            if let Some(path) = &report.thumbnail_path {
                record.thumbnail_path = Some(path.clone());
            }
            if let Some(m) = &report.metadata {
                record.size_bytes = Some(clamp_i64(m.size_bytes));
                record.low_res_size_bytes = Some(clamp_i64(m.low_res_size_bytes));
                record.original_resolution = Some(m.original_resolution.clone());
                record.low_resolution = Some(m.low_resolution.clone());
                record.duration_seconds = Some(m.duration_seconds);
            }
            record.last_progress_update = record.last_progress_update.max(Some(report.timestamp));
            Ok(Some(record.clone()))
        }

        async fn apply_failure(&self, report: &FailureReport) -> Result<Option<VideoRecord>> {
            let mut records = self.records.lock().unwrap();
            let Some(record) = records.get_mut(&report.video_id) else {
                return Ok(None);
            };
            record.status = VideoStatus::Failed.to_string();
            record.progress = 0;
            record.error = Some(report.error.clone());
            record.last_progress_update = record.last_progress_update.max(Some(report.timestamp));
            Ok(Some(record.clone()))
        }
    }
}
