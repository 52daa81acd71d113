use serde::{Deserialize, Serialize};

/// Queue message published by the gateway after an upload completes.
/// Delivered at least once; the pipeline must tolerate redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub user_id: i64,
    pub user_email: String,
    pub file_size: i64,
    pub file_key: String,
}
