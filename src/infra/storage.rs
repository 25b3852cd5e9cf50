//! S3 (or S3-compatible) blob storage adapter.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client, error::DisplayErrorContext, presigning::PresigningConfig, primitives::ByteStream,
};
use bytes::Bytes;
use tracing::debug;

use crate::{
    application::storage::{BlobStorage, BlobStorageError},
    domain::jobs::StorageLocation,
};

#[derive(Clone)]
pub struct S3BlobStorage {
    client: Client,
}

impl S3BlobStorage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS credential chain.
    ///
    /// A custom `endpoint` switches to path-style addressing for S3-compatible services.
    pub async fn connect(region: &str, endpoint: Option<&str>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), BlobStorageError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| BlobStorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        debug!(
            target = "infra::storage",
            bucket,
            key,
            bytes = size,
            "Uploaded object"
        );
        Ok(())
    }

    async fn presign_get(
        &self,
        location: &StorageLocation,
        expires_in: Duration,
    ) -> Result<String, BlobStorageError> {
        let presign_error = |message: String| BlobStorageError::Presign {
            key: location.key.clone(),
            message,
        };

        let config =
            PresigningConfig::expires_in(expires_in).map_err(|err| presign_error(err.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .customize()
            .config_override(
                aws_sdk_s3::config::Builder::default().region(Region::new(location.region.clone())),
            )
            .presigned(config)
            .await
            .map_err(|err| presign_error(DisplayErrorContext(&err).to_string()))?;

        Ok(request.uri().to_string())
    }
}
