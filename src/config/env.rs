use std::env;

pub enum EnvKey {
    EncryptKey,
    DatabaseUrl,
    AmqpUrl,
    AmqpVideoQueue,
    AmqpNotificationQueue,
    S3Endpoint,
    S3Region,
    S3VideoBucket,
    S3AudioBucket,
    AwsAccessKeyId,
    AwsSecretAccessKey,
    FfmpegPath,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::EncryptKey => "ENCRYPT_KEY",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::AmqpVideoQueue => "AMQP_VIDEO_QUEUE_NAME",
            EnvKey::AmqpNotificationQueue => "AMQP_NOTIFICATION_QUEUE_NAME",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::S3Region => "S3_REGION",
            EnvKey::S3VideoBucket => "S3_MP4_BUCKET",
            EnvKey::S3AudioBucket => "S3_MP3_BUCKET",
            EnvKey::AwsAccessKeyId => "AWS_ACCESS_KEY_ID",
            EnvKey::AwsSecretAccessKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok()
}
