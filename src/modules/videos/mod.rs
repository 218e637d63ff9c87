use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;
pub mod validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/videos", post(handler::register_video))
        .route("/videos/{id}", get(handler::get_video))
        .route("/videos/{id}/upload-complete", post(handler::upload_complete))
}
