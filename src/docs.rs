use utoipa::OpenApi;

use crate::common::health::HealthResponse;
use crate::modules::videos::dto::{QueuedJobResponse, RegisterVideoRequest};
use crate::modules::videos::model::{VideoRecord, VideoStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::common::health::api_health,
        crate::modules::videos::handler::register_video,
        crate::modules::videos::handler::get_video,
        crate::modules::videos::handler::upload_complete,
        crate::modules::notifications::ws::live_updates,
    ),
    components(
        schemas(
            HealthResponse,
            RegisterVideoRequest,
            QueuedJobResponse,
            VideoRecord,
            VideoStatus,
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Videos", description = "Video records and processing jobs"),
        (name = "Notifications", description = "Live processing updates")
    )
)]
pub struct ApiDoc;
