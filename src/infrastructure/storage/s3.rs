use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use tokio::fs::{self, File};
use tracing::{debug, info};

use super::object_store::{ObjectStore, StorageError};
use crate::config::settings::StorageSettings;

const CACHE_CONTROL: &str = "public, max-age=31536000";

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
}

impl StorageService {
    pub fn new(settings: &StorageSettings) -> Self {
        let credentials = Credentials::new(
            &settings.minio_access_key,
            &settings.minio_secret_key,
            None,
            None,
            "static",
        );

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(&settings.minio_url)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 (MinIO)");

        Self {
            client,
            bucket: settings.minio_bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn download(&self, key: &str, destination: &Path) -> Result<(), StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Download {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut reader = response.body.into_async_read();
        let mut file = File::create(destination).await?;
        let bytes = tokio::io::copy(&mut reader, &mut file).await?;
        file.sync_all().await?;

        debug!(key, bytes, "Downloaded object");
        Ok(())
    }

    async fn upload(&self, source: &Path, key: &str) -> Result<(), StorageError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let content_type = mime_guess::from_path(key)
            .first_or_octet_stream()
            .to_string();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .cache_control(CACHE_CONTROL)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(key, "Uploaded object");
        Ok(())
    }

    async fn read_head(&self, key: &str, len: usize) -> Result<Vec<u8>, StorageError> {
        let download_error = |message: String| StorageError::Download {
            key: key.to_string(),
            message,
        };

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes=0-{}", len.saturating_sub(1)))
            .send()
            .await
            .map_err(|e| download_error(DisplayErrorContext(&e).to_string()))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        let mut bytes = body.into_bytes().to_vec();
        bytes.truncate(len);
        Ok(bytes)
    }
}
