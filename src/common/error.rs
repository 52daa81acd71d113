use crate::common::encryptor::EncryptError;
use crate::infrastructure::storage::StorageError;
use crate::modules::conversion::publisher::NotifyError;
use crate::modules::conversion::repository::MetadataError;
use crate::modules::conversion::transcoder::TranscodeError;
use thiserror::Error;

/// Failure of a single conversion job.
///
/// The worker decides the acknowledgment action from [`ConvertError::ack_action`]
/// alone; message text is for logs only.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("malformed job payload: {0}")]
    MalformedJob(#[from] serde_json::Error),

    #[error("invalid file key: {0}")]
    InvalidKey(#[source] EncryptError),

    #[error("unsupported audio codec: {0:?}")]
    UnsupportedCodec(String),

    #[error("source object does not exist")]
    MissingSource,

    #[error("metadata already exists")]
    DuplicateMetadata,

    #[error("transient storage error: {0}")]
    StorageTransient(String),

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("broker error: {0}")]
    Broker(#[source] lapin::Error),

    #[error("job deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),

    #[error("{0}")]
    Other(#[source] anyhow::Error),
}

/// What the worker should tell the broker about a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    /// Negative-acknowledge with redelivery requested.
    Requeue,
    /// Negative-acknowledge without redelivery; the message is dropped.
    Drop,
}

impl ConvertError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConvertError::Broker(_)
                | ConvertError::DeadlineExceeded
                | ConvertError::StorageTransient(_)
                | ConvertError::Internal(_)
        )
    }

    pub fn ack_action(&self) -> AckAction {
        if self.is_transient() {
            AckAction::Requeue
        } else {
            AckAction::Drop
        }
    }
}

impl From<StorageError> for ConvertError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotExist => ConvertError::MissingSource,
            StorageError::Transient(code) => ConvertError::StorageTransient(code),
            StorageError::Other(source) => ConvertError::Storage(source),
        }
    }
}

impl From<MetadataError> for ConvertError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Duplicate => ConvertError::DuplicateMetadata,
            MetadataError::Database(source) => ConvertError::Other(anyhow::Error::new(source)),
        }
    }
}

impl From<TranscodeError> for ConvertError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::UnsupportedCodec(codec) => ConvertError::UnsupportedCodec(codec),
            TranscodeError::Io(source) => ConvertError::Internal(anyhow::Error::new(source)),
            TranscodeError::FfmpegFailed(status) => {
                ConvertError::Other(anyhow::anyhow!("ffmpeg exited with status {status}"))
            }
        }
    }
}

impl From<NotifyError> for ConvertError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Broker(source) => ConvertError::Broker(source),
            NotifyError::Serialize(source) => ConvertError::Internal(anyhow::Error::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed() -> ConvertError {
        let err = serde_json::from_slice::<crate::modules::conversion::events::ConversionJob>(
            b"not json",
        )
        .unwrap_err();
        ConvertError::MalformedJob(err)
    }

    // Every error kind must map to exactly one acknowledgment action.
    #[test]
    fn classification_is_complete() {
        let cases = [
            (malformed(), AckAction::Drop),
            (
                ConvertError::InvalidKey(EncryptError::InvalidCiphertext),
                AckAction::Drop,
            ),
            (
                ConvertError::UnsupportedCodec("opus".to_string()),
                AckAction::Drop,
            ),
            (ConvertError::MissingSource, AckAction::Drop),
            (ConvertError::DuplicateMetadata, AckAction::Drop),
            (
                ConvertError::StorageTransient("SlowDown".to_string()),
                AckAction::Requeue,
            ),
            (
                ConvertError::Storage(anyhow::anyhow!("access denied")),
                AckAction::Drop,
            ),
            (
                ConvertError::Broker(lapin::Error::from(
                    lapin::ErrorKind::ChannelsLimitReached,
                )),
                AckAction::Requeue,
            ),
            (ConvertError::DeadlineExceeded, AckAction::Requeue),
            (
                ConvertError::Internal(anyhow::anyhow!("processing failed")),
                AckAction::Requeue,
            ),
            (
                ConvertError::Other(anyhow::anyhow!("anything else")),
                AckAction::Drop,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.ack_action(), expected, "wrong action for {err}");
        }
    }

    #[test]
    fn storage_errors_keep_their_class() {
        assert!(matches!(
            ConvertError::from(StorageError::NotExist),
            ConvertError::MissingSource
        ));
        assert!(matches!(
            ConvertError::from(StorageError::Transient("ServiceUnavailable".into())),
            ConvertError::StorageTransient(_)
        ));
        assert!(matches!(
            ConvertError::from(StorageError::Other(anyhow::anyhow!("denied"))),
            ConvertError::Storage(_)
        ));
    }

    #[test]
    fn duplicate_metadata_is_permanent() {
        let err = ConvertError::from(MetadataError::Duplicate);
        assert_eq!(err.ack_action(), AckAction::Drop);
    }
}
