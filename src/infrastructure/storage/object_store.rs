use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to download {key}: {message}")]
    Download { key: String, message: String },

    #[error("failed to upload {key}: {message}")]
    Upload { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Blob storage addressed by object name. No transactional guarantees.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, key: &str, destination: &Path) -> Result<(), StorageError>;

    async fn upload(&self, source: &Path, key: &str) -> Result<(), StorageError>;

    /// At most the first `len` bytes of the object.
    async fn read_head(&self, key: &str, len: usize) -> Result<Vec<u8>, StorageError>;
}
