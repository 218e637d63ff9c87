use axum::Json;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    /// RFC 3339.
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(service: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.to_string(),
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Process is alive", body = HealthResponse)),
    tag = "Health"
)]
pub async fn api_health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("video-api"))
}

pub async fn worker_health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("video-worker"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_payload() {
        let value = serde_json::to_value(HealthResponse::healthy("video-worker")).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["service"], "video-worker");
        assert!(OffsetDateTime::parse(value["timestamp"].as_str().unwrap(), &Rfc3339).is_ok());
    }
}
