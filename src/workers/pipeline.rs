//! Single transcode attempt: download, probe, encode + thumbnail, upload.
//!
//! Every attempt works in its own temporary directory under the work root.
//! The directory is removed on every exit path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::notifier::Notifier;
use crate::infrastructure::media::encoding::{EncodingPlan, thumbnail_offset};
use crate::infrastructure::media::error::MediaError;
use crate::infrastructure::media::toolkit::{MediaToolkit, ProgressFn};
use crate::infrastructure::storage::object_store::{ObjectStore, StorageError};
use crate::modules::videos::events::{Notification, VideoMetadata, WorkMessage};

pub const PROGRESS_STARTED: u8 = 0;
pub const PROGRESS_DOWNLOADED: u8 = 20;
pub const PROGRESS_PROBED: u8 = 30;
pub const PROGRESS_ENCODED: u8 = 70;
pub const PROGRESS_THUMBNAIL: u8 = 85;
pub const PROGRESS_UPLOADED: u8 = 95;

const FALLBACK_EXTENSION: &str = ".mp4";
const THUMBNAIL_FILE: &str = "thumbnail.webp";

/// One processing error for the caller; the variant is only for logs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to prepare working directory: {0}")]
    Workspace(#[source] io::Error),

    #[error("download failed: {0}")]
    Download(#[source] StorageError),

    #[error("probe failed: {0}")]
    Probe(#[source] MediaError),

    #[error("transcode failed: {0}")]
    Transcode(#[source] MediaError),

    #[error("thumbnail failed: {0}")]
    Thumbnail(#[source] MediaError),

    #[error("upload failed: {0}")]
    Upload(#[source] StorageError),

    #[error("failed to inspect output: {0}")]
    Output(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    pub low_res_path: String,
    pub thumbnail_path: String,
    pub metadata: VideoMetadata,
}

/// Runs one processing attempt for a work message.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn process(&self, job: &WorkMessage) -> Result<ProcessingOutcome, PipelineError>;
}

/// Bucket keys of the derived artifacts, next to the source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub low_res: String,
    pub thumbnail: String,
    /// Extension of the source, dot included.
    pub extension: String,
}

pub fn artifact_paths(object_name: &str) -> ArtifactPaths {
    let (folder, file) = match object_name.rsplit_once('/') {
        Some((folder, file)) => (Some(folder), file),
        None => (None, object_name),
    };

    let (stem, extension) = match file.rfind('.') {
        Some(idx) if idx > 0 => (&file[..idx], file[idx..].to_string()),
        _ => (file, FALLBACK_EXTENSION.to_string()),
    };

    let key = |name: String| match folder {
        Some(folder) => format!("{}/{}", folder, name),
        None => name,
    };

    ArtifactPaths {
        low_res: key(format!("{}_low{}", stem, extension)),
        thumbnail: key(format!("{}_thumb.webp", stem)),
        extension,
    }
}

/// Maps an encoder percentage onto the overall `start..=end` range.
pub fn map_into_range(percent: f64, start: u8, end: u8) -> u8 {
    let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
    let span = f64::from(end.saturating_sub(start));
    (f64::from(start) + percent / 100.0 * span).round() as u8
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_root: PathBuf,
    pub max_bitrate_kbps: u32,
}

pub struct TranscodePipeline {
    storage: Arc<dyn ObjectStore>,
    media: Arc<dyn MediaToolkit>,
    notifier: Notifier,
    settings: PipelineSettings,
}

impl TranscodePipeline {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        media: Arc<dyn MediaToolkit>,
        notifier: Notifier,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            storage,
            media,
            notifier,
            settings,
        }
    }

    async fn progress(&self, video_id: Uuid, progress: u8) {
        self.notifier.send(Notification::progress(video_id, progress)).await;
    }

    async fn run(&self, job: &WorkMessage, workdir: &Path) -> Result<ProcessingOutcome, PipelineError> {
        let video_id = job.video_id;
        self.progress(video_id, PROGRESS_STARTED).await;

        let paths = artifact_paths(&job.object_name);
        let original = workdir.join(format!("original{}", paths.extension));
        let low_res = workdir.join(format!("low{}", paths.extension));
        let thumbnail = workdir.join(THUMBNAIL_FILE);

        info!(video_id = %video_id, object = %job.object_name, "Downloading original");
        self.storage
            .download(&job.object_name, &original)
            .await
            .map_err(PipelineError::Download)?;
        self.progress(video_id, PROGRESS_DOWNLOADED).await;

        let source = self.media.probe(&original).await.map_err(PipelineError::Probe)?;
        self.progress(video_id, PROGRESS_PROBED).await;

        let plan = EncodingPlan::for_source(source.height, self.settings.max_bitrate_kbps);
        info!(
            video_id = %video_id,
            resolution = %source.resolution(),
            duration = source.duration,
            bitrate_kbps = plan.bitrate_kbps,
            crf = plan.crf,
            "Encoding plan selected"
        );

        let encode = async {
            let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
            let last_sent = AtomicU8::new(PROGRESS_PROBED);
            let on_progress: ProgressFn = Arc::new(move |percent| {
                let mapped = map_into_range(percent, PROGRESS_PROBED, PROGRESS_ENCODED);
                if last_sent.fetch_max(mapped, Ordering::Relaxed) < mapped {
                    let _ = tx.send(mapped);
                }
            });

            let forward = async {
                while let Some(progress) = rx.recv().await {
                    self.progress(video_id, progress).await;
                }
            };

            // The callback, and with it the sender, is dropped once the
            // transcode future completes, which ends `forward`.
            let (result, ()) = tokio::join!(
                self.media.transcode(&original, &low_res, &plan, source.duration, on_progress),
                forward
            );
            result.map_err(PipelineError::Transcode)?;
            self.progress(video_id, PROGRESS_ENCODED).await;
            Ok::<_, PipelineError>(())
        };

        let snapshot = async {
            self.media
                .thumbnail(&original, &thumbnail, thumbnail_offset(source.duration))
                .await
                .map_err(PipelineError::Thumbnail)
        };

        tokio::try_join!(encode, snapshot)?;
        self.progress(video_id, PROGRESS_THUMBNAIL).await;

        let output = self.media.probe(&low_res).await.map_err(PipelineError::Probe)?;

        info!(video_id = %video_id, "Uploading processed files");
        tokio::try_join!(
            self.storage.upload(&low_res, &paths.low_res),
            self.storage.upload(&thumbnail, &paths.thumbnail),
        )
        .map_err(PipelineError::Upload)?;
        self.progress(video_id, PROGRESS_UPLOADED).await;

        let size_bytes = tokio::fs::metadata(&original).await.map_err(PipelineError::Output)?.len();
        let low_res_size_bytes = tokio::fs::metadata(&low_res).await.map_err(PipelineError::Output)?.len();

        let outcome = ProcessingOutcome {
            low_res_path: paths.low_res,
            thumbnail_path: paths.thumbnail,
            metadata: VideoMetadata {
                size_bytes,
                low_res_size_bytes,
                original_resolution: source.resolution(),
                low_resolution: output.resolution(),
                duration_seconds: source.duration,
            },
        };

        self.notifier
            .send(Notification::complete(
                video_id,
                outcome.low_res_path.clone(),
                outcome.thumbnail_path.clone(),
                outcome.metadata.clone(),
            ))
            .await;

        Ok(outcome)
    }
}

#[async_trait]
impl Transcoder for TranscodePipeline {
    async fn process(&self, job: &WorkMessage) -> Result<ProcessingOutcome, PipelineError> {
        tokio::fs::create_dir_all(&self.settings.work_root)
            .await
            .map_err(PipelineError::Workspace)?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}-", job.video_id))
            .tempdir_in(&self.settings.work_root)
            .map_err(PipelineError::Workspace)?;

        let result = self.run(job, workspace.path()).await;

        let workdir = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(video_id = %job.video_id, path = %workdir.display(), error = %e, "Failed to clean up working directory");
        }

        match &result {
            Ok(outcome) => info!(video_id = %job.video_id, low_res = %outcome.low_res_path, "Processing completed"),
            Err(e) => warn!(video_id = %job.video_id, error = %e, "Processing attempt failed"),
        }

        result
    }
}
