//! Blob storage port for finished artifacts.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::jobs::StorageLocation;

#[derive(Debug, Error)]
pub enum BlobStorageError {
    #[error("failed to upload `{key}`: {message}")]
    Upload { key: String, message: String },
    #[error("upload of `{key}` did not finish within {timeout:?}")]
    TimedOut { key: String, timeout: Duration },
    #[error("failed to presign `{key}`: {message}")]
    Presign { key: String, message: String },
    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes)
    -> Result<(), BlobStorageError>;

    /// Produce a time-limited download URL for an object, signed for the region it was stored in.
    async fn presign_get(
        &self,
        location: &StorageLocation,
        expires_in: Duration,
    ) -> Result<String, BlobStorageError>;
}
