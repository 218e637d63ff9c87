use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::modules::videos::dto::*;
use crate::modules::videos::model::VideoRecord;
use crate::modules::videos::service::{EnqueueOutcome, VideoService};
use crate::modules::videos::validation;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/v1/videos",
    request_body = RegisterVideoRequest,
    responses(
        (status = 201, description = "Video Registered", body = ApiResponse<VideoRecord>),
        (status = 400, description = "Bad Request"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn register_video(
    State(state): State<AppState>,
    Json(req): Json<RegisterVideoRequest>,
) -> impl IntoResponse {
    if let Err(e) = req.validate() {
        return ApiError(e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }
    let upload_check = validation::validate_extension(&req.file_name)
        .and_then(|()| match req.content_type.as_deref() {
            Some(content_type) => validation::validate_content_type(content_type),
            None => Ok(()),
        });
    if let Err(e) = upload_check {
        return ApiError(e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    match VideoService::register(&state, req).await {
        Ok(res) => ApiSuccess(ApiResponse::success(res, "Video registered successfully"), StatusCode::CREATED).into_response(),
        Err(e) => ApiError::internal(e).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/videos/{id}",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Get Video", body = ApiResponse<VideoRecord>),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match VideoService::get(&state, id).await {
        Ok(Some(res)) => ApiSuccess(ApiResponse::success(res, "Video retrieved successfully"), StatusCode::OK).into_response(),
        Ok(None) => ApiError::not_found("Video not found").into_response(),
        Err(e) => ApiError::internal(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/videos/{id}/upload-complete",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 202, description = "Processing Queued", body = ApiResponse<QueuedJobResponse>),
        (status = 400, description = "Uploaded file does not match its declared format"),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn upload_complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match VideoService::enqueue_processing(&state, id).await {
        Ok(Some(EnqueueOutcome::Rejected(reason))) => ApiError(reason, StatusCode::BAD_REQUEST).into_response(),
        Ok(Some(EnqueueOutcome::Queued(message))) => {
            let res = QueuedJobResponse {
                video_id: message.video_id,
                action: message.action,
                retry_count: message.retry_count,
            };
            ApiSuccess(ApiResponse::success(res, "Video queued for processing"), StatusCode::ACCEPTED).into_response()
        }
        Ok(None) => ApiError::not_found("Video not found").into_response(),
        Err(e) => ApiError::internal(e).into_response(),
    }
}
