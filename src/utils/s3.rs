use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use derive_more::Display;
use tracing::{info, warn};

use crate::config::StorageConfig;

#[derive(Debug, Display)]
pub enum StorageError {
    #[display(fmt = "object not found: {}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Backend(String),
}

impl std::error::Error for StorageError {}

fn backend<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Backend(DisplayErrorContext(err).to_string())
}

/// Where uploaded document bytes live.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removing a key that does not exist succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Object key for a stored file: `<user id>/<stored filename>`.
pub fn object_key(user_id: &str, filename: &str) -> String {
    format!("{user_id}/{filename}")
}

/// S3-compatible store, pointed at MinIO with path-style addressing.
pub struct S3Store {
    client: Client,
    bucket: String,
    endpoint: String,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .force_path_style(true)
            .credentials_provider(credentials)
            .build();

        S3Store {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint_url(),
        }
    }

    /// Creates the bucket with a public-read policy when it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            info!(bucket = %self.bucket, "object storage bucket already exists");
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(backend)?;

        self.client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(public_read_policy(&self.bucket))
            .send()
            .await
            .map_err(backend)?;

        info!(bucket = %self.bucket, "object storage bucket created with public read policy");
        Ok(())
    }
}

fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "AWS": ["*"] },
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{bucket}/*")]
        }]
    })
    .to_string()
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => output,
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_no_such_key() => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(backend(e)),
        };

        let data = output.body.collect().await.map_err(backend)?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.client.delete_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err)) if service_err.err().code() == Some("NoSuchKey") => {
                warn!(key, "object already absent");
                Ok(())
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let presigning_config = PresigningConfig::expires_in(expires_in).map_err(backend)?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(backend)?;

        Ok(request.uri().to_string())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}
