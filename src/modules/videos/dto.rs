use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::events::JobAction;

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVideoRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// Bucket key the original was uploaded to.
    #[validate(length(min = 1, max = 1024))]
    pub object_name: String,
    /// Guessed from `file_name` when absent.
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJobResponse {
    pub video_id: Uuid,
    #[schema(value_type = String, example = "process")]
    pub action: JobAction,
    pub retry_count: u32,
}
