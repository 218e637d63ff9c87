use axum::Router;
use axum::routing::get;

use crate::state::AppState;

pub mod guard;
pub mod hub;
pub mod relay;
pub mod ws;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::live_updates))
}
