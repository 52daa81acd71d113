use super::model::Metadata;
use crate::infrastructure::queue::rabbitmq::{self, RabbitMqService};
use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Downstream notification capability; consumed by the mailer service.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, metadata: &Metadata, email: &str) -> Result<(), NotifyError>;
}

pub struct NotificationPublisher {
    channel: Channel,
    queue: String,
}

impl NotificationPublisher {
    pub async fn new(queue: &RabbitMqService, queue_name: &str) -> Result<Self, lapin::Error> {
        let channel = queue.create_channel().await?;
        rabbitmq::declare_durable(&channel, queue_name).await?;

        Ok(Self {
            channel,
            queue: queue_name.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for NotificationPublisher {
    async fn publish(&self, metadata: &Metadata, email: &str) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(metadata)?;

        // The recipient address travels out-of-band so the body stays a
        // plain metadata document
        let mut headers = FieldTable::default();
        headers.insert("email".into(), AMQPValue::LongString(email.into()));

        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // persistent
                    .with_content_type("application/json".into())
                    .with_headers(headers),
            )
            .await?
            .await?;

        info!(user_id = metadata.user_id, "📨 notification published");
        Ok(())
    }
}
