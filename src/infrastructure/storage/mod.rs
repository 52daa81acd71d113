pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Declared sizes above this use the multi-part read strategy.
pub const LARGE_OBJECT_THRESHOLD: i64 = 1 << 26; // 64 MiB

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object does not exist")]
    NotExist,

    /// Throttling/unavailability codes and network timeouts; safe to retry.
    #[error("transient storage error: {0}")]
    Transient(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Object storage capability used by the conversion pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes an object and does not return until it is confirmed
    /// retrievable, so callers can chain "store then persist metadata".
    async fn write(
        &self,
        key: &str,
        content_type: &str,
        bucket: &str,
        body: Bytes,
    ) -> Result<(), StorageError>;

    async fn read_small(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    async fn read_large(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Deleting a missing key reports [`StorageError::NotExist`] so cleanup
    /// can treat it as already satisfied.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    Small,
    Large,
}

impl ReadStrategy {
    pub fn for_size(size: i64) -> Self {
        if size > LARGE_OBJECT_THRESHOLD {
            ReadStrategy::Large
        } else {
            ReadStrategy::Small
        }
    }
}
