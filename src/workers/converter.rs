use crate::common::error::{AckAction, ConvertError};
use crate::infrastructure::queue::rabbitmq::{self, RabbitMqService};
use crate::modules::conversion::events::ConversionJob;
use crate::modules::conversion::model::Metadata;
use crate::modules::conversion::service::ConverterService;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Upper bound for one dispatch cycle. Jobs that exceed it are treated as
/// transient timeouts and requeued.
pub const JOB_DEADLINE: Duration = Duration::from_secs(3 * 60);

/// Consumes the video queue until shutdown. Each delivery runs on its own
/// task so a slow transcode does not block receipt of unrelated messages;
/// in-flight jobs are drained before the function returns.
pub async fn run(
    queue: RabbitMqService,
    queue_name: &str,
    service: Arc<ConverterService>,
) -> anyhow::Result<()> {
    let channel = queue.create_channel().await?;
    rabbitmq::declare_durable(&channel, queue_name).await?;

    let mut consumer = channel
        .basic_consume(
            queue_name,
            "converter_worker",
            BasicConsumeOptions::default(), // manual ack
            FieldTable::default(),
        )
        .await?;

    info!("🎧 Converter worker listening on '{}'", queue_name);

    let tracker = TaskTracker::new();

    loop {
        tokio::select! {
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    info!("consumer stream closed");
                    break;
                };

                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        error!("failed to receive delivery: {err}");
                        continue;
                    }
                };

                let service = service.clone();
                tracker.spawn(async move {
                    handle_delivery(delivery, service).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, draining in-flight jobs");
                break;
            }
        }
    }

    tracker.close();
    tracker.wait().await;

    Ok(())
}

/// Runs one job and settles its delivery. The message is acknowledged only
/// after the pipeline has fully completed; failures are settled from the
/// error classification alone.
async fn handle_delivery(delivery: Delivery, service: Arc<ConverterService>) {
    match process(&delivery.data, service).await {
        Ok(metadata) => {
            info!(
                user_id = metadata.user_id,
                file = %metadata.file_name,
                "✅ conversion completed"
            );

            if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                error!("failed to ack message: {err}");
            }
        }
        Err(err) => {
            let requeue = err.ack_action() == AckAction::Requeue;
            error!(requeue, "❌ conversion failed: {err}");

            if let Err(nack_err) = delivery
                .nack(BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                })
                .await
            {
                error!("failed to nack message: {nack_err}");
            }
        }
    }
}

async fn process(body: &[u8], service: Arc<ConverterService>) -> Result<Metadata, ConvertError> {
    let job: ConversionJob = serde_json::from_slice(body)?;

    info!(
        user_id = job.user_id,
        size = job.file_size,
        "📦 received conversion job"
    );

    match tokio::time::timeout(JOB_DEADLINE, service.convert(&job)).await {
        Ok(result) => result,
        Err(_) => Err(ConvertError::DeadlineExceeded),
    }
}
