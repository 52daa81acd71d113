use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct RabbitMqService {
    conn: Arc<Connection>,
}

impl RabbitMqService {
    pub async fn new(url: &str) -> Result<Self, lapin::Error> {
        info!("Connecting to RabbitMQ...");
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        info!("✅ Connected to RabbitMQ");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    pub async fn create_channel(&self) -> Result<Channel, lapin::Error> {
        self.conn.create_channel().await
    }
}

/// Declares a durable queue; survives broker restarts, messages are
/// redelivered until acknowledged.
pub async fn declare_durable(channel: &Channel, queue: &str) -> Result<(), lapin::Error> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    Ok(())
}
