use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{ObjectStorage, StorageError, StorageResult, content_type_for};
use crate::config::settings::StorageConfig;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // MinIO / B2 S3 API
            .build();

        let client = Client::from_conf(sdk_config);

        info!("✅ Object storage client ready (bucket: {})", config.bucket);

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStorage for StorageService {
    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()> {
        debug!("Downloading {} to {}", key, local_path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::DownloadFailed(message)
                }
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = std::pin::pin!(response.body.into_async_read());
        let mut file = tokio::fs::File::create(local_path).await?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("{}: {}", key, e)))?;
        file.flush().await?;

        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", local_path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(key))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", key, e)))?;

        debug!("Uploaded {} to {}", local_path.display(), key);
        Ok(())
    }

    async fn upload_bytes(&self, data: Bytes, key: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type_for(key))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", key, e)))?;

        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}
