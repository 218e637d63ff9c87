use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Answer of an existence query against the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPresence {
    Present,
    Absent,
    /// The store could not be asked (timeout, network error, unexpected status).
    Unknown(String),
}

#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn presence(&self, video_id: Uuid) -> RecordPresence;
}

/// Asks the api tier over HTTP whether a video record still exists.
pub struct RecordApiClient {
    client: Client,
    base_url: String,
}

impl RecordApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid record API base URL '{}'", base_url))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn video_url(&self, video_id: Uuid) -> String {
        format!("{}/api/v1/videos/{}", self.base_url, video_id)
    }
}

#[async_trait]
impl RecordLookup for RecordApiClient {
    async fn presence(&self, video_id: Uuid) -> RecordPresence {
        let url = self.video_url(video_id);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(video_id = %video_id, status = %status, "Existence check answered");
                match status {
                    s if s.is_success() => RecordPresence::Present,
                    StatusCode::NOT_FOUND => RecordPresence::Absent,
                    other => RecordPresence::Unknown(format!("unexpected status {}", other)),
                }
            }
            Err(e) if e.is_timeout() => RecordPresence::Unknown("existence check timed out".to_string()),
            Err(e) => RecordPresence::Unknown(e.to_string()),
        }
    }
}
