use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found on PATH")]
    BinaryNotFound(&'static str),

    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("no video stream in {}", .0.display())]
    NoVideoStream(PathBuf),

    #[error("ffmpeg exited with status {code:?}: {stderr}")]
    FfmpegFailed { code: Option<i32>, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;
