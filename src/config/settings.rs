use crate::config::env::{self, EnvKey};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub encrypt_key: String,
    pub database_url: String,
    pub amqp_url: String,
    pub video_queue: String,
    pub notification_queue: String,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub video_bucket: String,
    pub audio_bucket: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub ffmpeg_path: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            encrypt_key: env::get(EnvKey::EncryptKey)?,
            database_url: env::get(EnvKey::DatabaseUrl)?,
            amqp_url: env::get(EnvKey::AmqpUrl)?,
            video_queue: env::get_or(EnvKey::AmqpVideoQueue, "video_conversion"),
            notification_queue: env::get_or(EnvKey::AmqpNotificationQueue, "email_notification"),
            s3_endpoint: env::get_opt(EnvKey::S3Endpoint),
            s3_region: env::get_or(EnvKey::S3Region, "us-east-1"),
            video_bucket: env::get(EnvKey::S3VideoBucket)?,
            audio_bucket: env::get(EnvKey::S3AudioBucket)?,
            aws_access_key_id: env::get(EnvKey::AwsAccessKeyId)?,
            aws_secret_access_key: env::get(EnvKey::AwsSecretAccessKey)?,
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
        })
    }
}
