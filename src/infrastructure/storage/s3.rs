use super::{ObjectStore, StorageError};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Part size for ranged downloads of large objects.
const PART_SIZE: i64 = 10 << 20; // 10 MiB

/// Bounded wait for the read-after-write confirmation.
const WRITE_CONFIRM_WAIT: Duration = Duration::from_secs(60);
const WRITE_CONFIRM_INTERVAL: Duration = Duration::from_secs(2);

/// S3 error codes that resolve on retry.
const TRANSIENT_CODES: [&str; 6] = [
    "SlowDown",
    "RequestTimeout",
    "RequestTimeTooSkewed",
    "OperationAborted",
    "ServiceUnavailable",
    "InternalError",
];

#[derive(Clone)]
pub struct StorageService {
    client: Client,
}

impl StorageService {
    pub fn new(
        region: &str,
        endpoint: Option<&str>,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials);

        // Path-style addressing for MinIO-compatible endpoints
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!("✅ Connected to S3");

        Self { client }
    }

    async fn confirm_written(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let deadline = Instant::now() + WRITE_CONFIRM_WAIT;

        loop {
            match self
                .client
                .head_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                    if Instant::now() >= deadline {
                        return Err(StorageError::Transient(format!(
                            "object {key} not visible after write"
                        )));
                    }
                    tokio::time::sleep(WRITE_CONFIRM_INTERVAL).await;
                }
                Err(err) => return Err(classify_sdk_error(err)),
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn write(
        &self,
        key: &str,
        content_type: &str,
        bucket: &str,
        body: Bytes,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        self.confirm_written(bucket, key).await
    }

    async fn read_small(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotExist
                } else {
                    classify_sdk_error(err)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Other(anyhow::Error::new(err)))?;

        Ok(data.into_bytes())
    }

    async fn read_large(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    StorageError::NotExist
                } else {
                    classify_sdk_error(err)
                }
            })?;

        let size = head.content_length().unwrap_or(0);
        let mut buffer = Vec::with_capacity(size.max(0) as usize);
        let mut start: i64 = 0;

        while start < size {
            let end = (start + PART_SIZE).min(size) - 1;
            debug!("downloading {key} bytes {start}-{end} of {size}");

            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .range(format!("bytes={start}-{end}"))
                .send()
                .await
                .map_err(classify_sdk_error)?;

            let part = output
                .body
                .collect()
                .await
                .map_err(|err| StorageError::Other(anyhow::Error::new(err)))?;
            buffer.extend_from_slice(&part.into_bytes());

            start = end + 1;
        }

        Ok(Bytes::from(buffer))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.code() == Some("NoSuchKey") {
                    StorageError::NotExist
                } else {
                    classify_sdk_error(err)
                }
            })?;

        Ok(())
    }
}

fn classify_sdk_error<E>(err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) {
        return StorageError::Transient(err.to_string());
    }

    match err.code() {
        Some(code) if TRANSIENT_CODES.contains(&code) => StorageError::Transient(code.to_string()),
        _ => StorageError::Other(anyhow::Error::new(err)),
    }
}
