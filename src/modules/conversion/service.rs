use super::events::ConversionJob;
use super::model::Metadata;
use super::publisher::Notifier;
use super::repository::MetadataStore;
use super::transcoder::{Transcode, mime_type};
use crate::common::encryptor::Encryptor;
use crate::common::error::ConvertError;
use crate::infrastructure::storage::{ObjectStore, ReadStrategy};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Buckets {
    pub video: String,
    pub audio: String,
}

/// The conversion pipeline: decode key → fetch video → transcode → store
/// audio → persist metadata → publish notification.
///
/// Depends only on the capability traits so the pipeline can be exercised
/// without live infrastructure.
pub struct ConverterService {
    store: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    transcoder: Arc<dyn Transcode>,
    notifier: Arc<dyn Notifier>,
    encryptor: Encryptor,
    buckets: Buckets,
}

impl ConverterService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        transcoder: Arc<dyn Transcode>,
        notifier: Arc<dyn Notifier>,
        encryptor: Encryptor,
        buckets: Buckets,
    ) -> Self {
        Self {
            store,
            metadata,
            transcoder,
            notifier,
            encryptor,
            buckets,
        }
    }

    pub async fn convert(&self, job: &ConversionJob) -> Result<Metadata, ConvertError> {
        // A key that fails to decode can never be fixed by redelivery
        let file_name = self
            .encryptor
            .decrypt(&job.file_key)
            .map_err(ConvertError::InvalidKey)?;

        // Redelivery after a publish-only failure skips straight to the
        // notification instead of re-running the pipeline into the
        // duplicate-metadata path
        if let Some(existing) = self
            .metadata
            .find(job.user_id, &file_name, &job.file_key)
            .await?
        {
            info!(
                user_id = job.user_id,
                file = %file_name,
                "metadata already recorded, re-publishing notification"
            );
            self.notifier.publish(&existing, &job.user_email).await?;
            return Ok(existing);
        }

        let video = self.fetch(&job.file_key, job.file_size).await?;

        let workspace = JobWorkspace::create(&job.file_key)?;
        let output = self
            .transcoder
            .transcode(workspace.path(), &file_name, video)
            .await?;

        let audio_key = self.store_audio(&output).await?;

        let metadata = Metadata {
            user_id: job.user_id,
            file_name,
            video_key: job.file_key.clone(),
            audio_key,
        };

        // A duplicate insert is reported but the stored audio object stays:
        // it already exists and is addressable
        if let Err(err) = self.metadata.insert(&metadata).await {
            warn!(user_id = metadata.user_id, "failed to save metadata: {err}");
            return Err(err.into());
        }

        self.notifier.publish(&metadata, &job.user_email).await?;

        Ok(metadata)
    }

    async fn fetch(&self, file_key: &str, file_size: i64) -> Result<Bytes, ConvertError> {
        let object_key = format!("{file_key}.mp4");

        let video = match ReadStrategy::for_size(file_size) {
            ReadStrategy::Small => self.store.read_small(&self.buckets.video, &object_key).await,
            ReadStrategy::Large => self.store.read_large(&self.buckets.video, &object_key).await,
        }?;

        Ok(video)
    }

    /// Encrypts the output path into a fresh opaque key and uploads the
    /// audio under `<key>.<ext>`.
    async fn store_audio(&self, output: &Path) -> Result<String, ConvertError> {
        let path = output.to_string_lossy();
        let audio_key = self
            .encryptor
            .encrypt(&path)
            .map_err(|err| ConvertError::Internal(anyhow::Error::new(err)))?;

        let extension = output
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        let body = tokio::fs::read(output)
            .await
            .map_err(|err| ConvertError::Internal(anyhow::Error::new(err)))?;

        self.store
            .write(
                &format!("{audio_key}.{extension}"),
                mime_type(extension),
                &self.buckets.audio,
                Bytes::from(body),
            )
            .await?;

        Ok(audio_key)
    }
}

/// Scratch directory for one job, removed on every exit path.
///
/// The directory name is derived from the file key, so a redelivered job
/// resolves to the same output path and therefore the same audio key.
struct JobWorkspace {
    dir: PathBuf,
}

impl JobWorkspace {
    fn create(file_key: &str) -> Result<Self, ConvertError> {
        let digest = Sha256::digest(file_key.as_bytes());
        let dir = std::env::temp_dir().join(format!("convert-{}", &hex::encode(digest)[..16]));

        std::fs::create_dir_all(&dir)
            .map_err(|err| ConvertError::Internal(anyhow::Error::new(err)))?;

        Ok(Self { dir })
    }

    fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            warn!("failed to remove scratch dir {}: {err}", self.dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::AckAction;
    use crate::infrastructure::storage::{LARGE_OBJECT_THRESHOLD, StorageError};
    use crate::modules::conversion::publisher::NotifyError;
    use crate::modules::conversion::repository::MetadataError;
    use crate::modules::conversion::transcoder::TranscodeError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const MASTER_KEY: &str = "0123456780123456789abcdef9abcdef0123456780123456789abcdef9abcdef";

    #[derive(Debug, PartialEq, Eq)]
    struct WriteCall {
        key: String,
        content_type: String,
        bucket: String,
        body: Vec<u8>,
    }

    #[derive(Default)]
    struct MockStore {
        video: Vec<u8>,
        small_reads: Mutex<Vec<(String, String)>>,
        large_reads: Mutex<Vec<(String, String)>>,
        writes: Mutex<Vec<WriteCall>>,
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn write(
            &self,
            key: &str,
            content_type: &str,
            bucket: &str,
            body: Bytes,
        ) -> Result<(), StorageError> {
            self.writes.lock().unwrap().push(WriteCall {
                key: key.to_string(),
                content_type: content_type.to_string(),
                bucket: bucket.to_string(),
                body: body.to_vec(),
            });
            Ok(())
        }

        async fn read_small(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
            self.small_reads
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            Ok(Bytes::from(self.video.clone()))
        }

        async fn read_large(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
            self.large_reads
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            Ok(Bytes::from(self.video.clone()))
        }

        async fn delete(&self, _bucket: &str, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    /// Pretends the source holds the given codec and writes a fake output
    /// file the way ffmpeg would.
    struct MockTranscoder {
        extension: &'static str,
    }

    #[async_trait]
    impl Transcode for MockTranscoder {
        async fn transcode(
            &self,
            work_dir: &Path,
            file_name: &str,
            _video: Bytes,
        ) -> Result<PathBuf, TranscodeError> {
            let output = work_dir.join(file_name).with_extension(self.extension);
            std::fs::write(&output, b"fake audio bytes")?;
            Ok(output)
        }
    }

    #[derive(Default)]
    struct MockMetadata {
        existing: Option<Metadata>,
        duplicate: bool,
        inserted: Mutex<Vec<Metadata>>,
    }

    #[async_trait]
    impl MetadataStore for MockMetadata {
        async fn insert(&self, metadata: &Metadata) -> Result<(), MetadataError> {
            if self.duplicate {
                return Err(MetadataError::Duplicate);
            }
            self.inserted.lock().unwrap().push(metadata.clone());
            Ok(())
        }

        async fn find(
            &self,
            _user_id: i64,
            _file_name: &str,
            _video_key: &str,
        ) -> Result<Option<Metadata>, MetadataError> {
            Ok(self.existing.clone())
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        fail: bool,
        published: Mutex<Vec<(Metadata, String)>>,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn publish(&self, metadata: &Metadata, email: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Broker(lapin::Error::from(
                    lapin::ErrorKind::ChannelsLimitReached,
                )));
            }
            self.published
                .lock()
                .unwrap()
                .push((metadata.clone(), email.to_string()));
            Ok(())
        }
    }

    fn encryptor() -> Encryptor {
        Encryptor::new(MASTER_KEY).unwrap()
    }

    fn service(
        store: Arc<MockStore>,
        metadata: Arc<MockMetadata>,
        notifier: Arc<MockNotifier>,
    ) -> ConverterService {
        ConverterService::new(
            store,
            metadata,
            Arc::new(MockTranscoder { extension: "mp3" }),
            notifier,
            encryptor(),
            Buckets {
                video: "videos".to_string(),
                audio: "audios".to_string(),
            },
        )
    }

    // Distinct file names per test: the scratch directory is derived from
    // the file key, and tests run in parallel.
    fn job(file_name: &str, file_size: i64) -> ConversionJob {
        ConversionJob {
            user_id: 1,
            user_email: "a@b.com".to_string(),
            file_size,
            file_key: encryptor().encrypt(file_name).unwrap(),
        }
    }

    #[tokio::test]
    async fn end_to_end_mp3_conversion() {
        let store = Arc::new(MockStore {
            video: b"video bytes".to_vec(),
            ..MockStore::default()
        });
        let metadata = Arc::new(MockMetadata::default());
        let notifier = Arc::new(MockNotifier::default());
        let svc = service(store.clone(), metadata.clone(), notifier.clone());

        let job = job("clip.mp4", 1000);
        let result = svc.convert(&job).await.unwrap();

        // source fetched with the small strategy from the video bucket
        let reads = store.small_reads.lock().unwrap();
        assert_eq!(reads.as_slice(), [(
            "videos".to_string(),
            format!("{}.mp4", job.file_key)
        )]);
        assert!(store.large_reads.lock().unwrap().is_empty());

        // audio stored under the fresh key with the policy MIME type
        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].key, format!("{}.mp3", result.audio_key));
        assert_eq!(writes[0].content_type, "audio/mpeg");
        assert_eq!(writes[0].bucket, "audios");
        assert_eq!(writes[0].body, b"fake audio bytes");

        // metadata row persisted
        assert_eq!(result.user_id, 1);
        assert_eq!(result.file_name, "clip.mp4");
        assert_eq!(result.video_key, job.file_key);
        assert_ne!(result.audio_key, job.file_key);
        assert_eq!(metadata.inserted.lock().unwrap().as_slice(), [result.clone()]);

        // the audio key decodes to the transcoder's output path
        let output_path = encryptor().decrypt(&result.audio_key).unwrap();
        assert!(output_path.ends_with("clip.mp3"));

        // notification carries the metadata and the recipient address
        let published = notifier.published.lock().unwrap();
        assert_eq!(published.as_slice(), [(result, "a@b.com".to_string())]);
    }

    #[tokio::test]
    async fn sizes_above_threshold_use_large_reads() {
        let store = Arc::new(MockStore::default());
        let metadata = Arc::new(MockMetadata::default());
        let notifier = Arc::new(MockNotifier::default());
        let svc = service(store.clone(), metadata, notifier);

        svc.convert(&job("big.mp4", LARGE_OBJECT_THRESHOLD + 1))
            .await
            .unwrap();

        assert!(store.small_reads.lock().unwrap().is_empty());
        assert_eq!(store.large_reads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_key_fails_before_any_side_effect() {
        let store = Arc::new(MockStore::default());
        let metadata = Arc::new(MockMetadata::default());
        let notifier = Arc::new(MockNotifier::default());
        let svc = service(store.clone(), metadata.clone(), notifier.clone());

        let mut bad_job = job("bad.mp4", 1000);
        bad_job.file_key = "not-a-valid-key".to_string();

        let err = svc.convert(&bad_job).await.unwrap_err();
        assert!(matches!(err, ConvertError::InvalidKey(_)));
        assert_eq!(err.ack_action(), AckAction::Drop);

        assert!(store.small_reads.lock().unwrap().is_empty());
        assert!(store.writes.lock().unwrap().is_empty());
        assert!(metadata.inserted.lock().unwrap().is_empty());
        assert!(notifier.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recorded_job_only_republishes_notification() {
        let job = job("recorded.mp4", 1000);
        let existing = Metadata {
            user_id: 1,
            file_name: "clip.mp4".to_string(),
            video_key: job.file_key.clone(),
            audio_key: "earlier-key".to_string(),
        };

        let store = Arc::new(MockStore::default());
        let metadata = Arc::new(MockMetadata {
            existing: Some(existing.clone()),
            ..MockMetadata::default()
        });
        let notifier = Arc::new(MockNotifier::default());
        let svc = service(store.clone(), metadata.clone(), notifier.clone());

        let result = svc.convert(&job).await.unwrap();
        assert_eq!(result, existing);

        // no fetch, no upload, no second insert
        assert!(store.small_reads.lock().unwrap().is_empty());
        assert!(store.writes.lock().unwrap().is_empty());
        assert!(metadata.inserted.lock().unwrap().is_empty());
        assert_eq!(notifier.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_keeps_stored_audio_and_skips_notification() {
        let store = Arc::new(MockStore::default());
        let metadata = Arc::new(MockMetadata {
            duplicate: true,
            ..MockMetadata::default()
        });
        let notifier = Arc::new(MockNotifier::default());
        let svc = service(store.clone(), metadata, notifier.clone());

        let err = svc.convert(&job("dup.mp4", 1000)).await.unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateMetadata));
        assert_eq!(err.ack_action(), AckAction::Drop);

        // the uploaded object is not rolled back
        assert_eq!(store.writes.lock().unwrap().len(), 1);
        assert!(notifier.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_transient_and_preserves_metadata() {
        let store = Arc::new(MockStore::default());
        let metadata = Arc::new(MockMetadata::default());
        let notifier = Arc::new(MockNotifier {
            fail: true,
            ..MockNotifier::default()
        });
        let svc = service(store, metadata.clone(), notifier);

        let err = svc.convert(&job("notify.mp4", 1000)).await.unwrap_err();
        assert!(matches!(err, ConvertError::Broker(_)));
        assert_eq!(err.ack_action(), AckAction::Requeue);
        assert_eq!(metadata.inserted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn redelivery_yields_the_same_audio_key() {
        let job = job("redelivered.mp4", 1000);

        let first = service(
            Arc::new(MockStore::default()),
            Arc::new(MockMetadata::default()),
            Arc::new(MockNotifier::default()),
        )
        .convert(&job)
        .await
        .unwrap();

        let second = service(
            Arc::new(MockStore::default()),
            Arc::new(MockMetadata::default()),
            Arc::new(MockNotifier::default()),
        )
        .convert(&job)
        .await
        .unwrap();

        assert_eq!(first.audio_key, second.audio_key);
    }
}
