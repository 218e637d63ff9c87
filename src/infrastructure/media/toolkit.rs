use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::encoding::EncodingPlan;
use super::error::MediaResult;
use super::probe::MediaInfo;

/// Receives encoder progress as a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// The media operations the transcode pipeline depends on.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        plan: &EncodingPlan,
        duration_secs: f64,
        on_progress: ProgressFn,
    ) -> MediaResult<()>;

    /// Writes a single frame taken `at_seconds` into the source.
    async fn thumbnail(&self, input: &Path, output: &Path, at_seconds: f64) -> MediaResult<()>;
}
