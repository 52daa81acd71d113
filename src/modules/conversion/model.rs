use serde::{Deserialize, Serialize};

/// Durable record of a completed conversion. Written exactly once per job;
/// never mutated or deleted by this worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Metadata {
    pub user_id: i64,
    /// Original file name, recovered by decrypting the video key.
    pub file_name: String,
    /// Opaque key of the source video object.
    pub video_key: String,
    /// Opaque key of the produced audio object.
    pub audio_key: String,
}
