use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod common;
mod config;
mod infrastructure;
mod modules;
mod workers;

use crate::common::encryptor::Encryptor;
use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::conversion::publisher::NotificationPublisher;
use crate::modules::conversion::repository::MetadataRepository;
use crate::modules::conversion::service::{Buckets, ConverterService};
use crate::modules::conversion::transcoder::FfmpegTranscoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting converter worker...");

    let config = AppConfig::new().context("failed to load configuration")?;

    // A wrong-length master key must keep the process from starting
    let encryptor = Encryptor::new(&config.encrypt_key).context("failed to create encryptor")?;

    let db = pool::connect_to_db(&config.database_url)
        .await
        .context("failed to connect to database")?;
    MetadataRepository::migrate(&db)
        .await
        .context("failed to run metadata migration")?;

    let storage = StorageService::new(
        &config.s3_region,
        config.s3_endpoint.as_deref(),
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
    );

    let queue = RabbitMqService::new(&config.amqp_url)
        .await
        .context("failed to connect to RabbitMQ")?;

    let publisher = NotificationPublisher::new(&queue, &config.notification_queue)
        .await
        .context("failed to create notification publisher")?;

    let service = Arc::new(ConverterService::new(
        Arc::new(storage),
        Arc::new(MetadataRepository::new(db)),
        Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        Arc::new(publisher),
        encryptor,
        Buckets {
            video: config.video_bucket.clone(),
            audio: config.audio_bucket.clone(),
        },
    ));

    workers::converter::run(queue, &config.video_queue, service).await
}
