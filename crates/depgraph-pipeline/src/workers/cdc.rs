//! CDC entry points: the event-log publisher and the requirements
//! subscriber that closes the correlation feedback loop.

use depgraph_broker::{PublishService, start_consume_thread, topology};
use depgraph_core::config::{BatchConfig, PostgresConfig, RabbitConfig};
use depgraph_core::models::{CdcOperation, EventLogEntry, Requirement};
use depgraph_store::CdcRepository;
use lapin::Channel;

use crate::error::Result;
use crate::services::CdcPublisher;

/// Drain the event log to the broker, forever.
pub async fn run_publisher() -> Result<()> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;
    let batch = BatchConfig::from_env()?;

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;
    let cdc = CdcRepository::new(pool, batch.cdc_iter_batch_size);

    // Declare topology up front so the CDC queues exist before the first
    // publish.
    let connection = depgraph_broker::connect(&rabbit).await?;
    let channel = connection.create_channel().await?;
    depgraph_broker::declare_topology(&channel, &rabbit).await?;
    let _ = connection.close(200, "").await;

    let publisher = CdcPublisher::new(cdc, PublishService::new(rabbit.clone()), rabbit);

    tracing::info!("running");
    publisher.run().await
}

/// Consume requirement CDC events, feeding INSERT/UPDATE after-images back
/// into the candidate-correlation queue.
pub async fn run_requirements_subscriber() -> Result<()> {
    let rabbit = RabbitConfig::from_env()?;
    let publisher = PublishService::new(rabbit.clone());

    tracing::info!("initializing broker connection");
    let connection = depgraph_broker::connect(&rabbit).await?;
    let channel = connection.create_channel().await?;
    depgraph_broker::declare_topology(&channel, &rabbit).await?;

    tracing::info!("starting consumer thread");
    let mut subscription = start_consume_thread::<EventLogEntry>(
        rabbit.clone(),
        topology::CDC_REQUIREMENTS_QUEUE,
        rabbit.cdc_requirements_prefetch,
    )?;

    tracing::info!("running");
    while let Some(event) = subscription.recv().await {
        match handle_event(&publisher, &channel, &event).await {
            Ok(()) => subscription.ack(true).await,
            Err(error) => {
                tracing::error!(
                    %error,
                    event_id = event.event_id,
                    "error while handling CDC requirement event"
                );
                subscription.ack(false).await;
                return Err(error);
            }
        }
    }

    Ok(())
}

async fn handle_event(
    publisher: &PublishService,
    channel: &Channel,
    event: &EventLogEntry,
) -> Result<()> {
    if !matches!(event.operation, CdcOperation::Insert | CdcOperation::Update) {
        return Ok(());
    }
    let Some(after) = &event.after else {
        return Ok(());
    };

    let requirement: Requirement = serde_json::from_value(after.clone())?;
    publisher
        .publish_requirement_for_candidate_correlation(&requirement, Some(channel))
        .await?;
    Ok(())
}
