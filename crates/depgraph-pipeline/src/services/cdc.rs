//! Draining the CDC event log to the broker.

use std::time::Duration;

use depgraph_broker::PublishService;
use depgraph_core::config::RabbitConfig;
use depgraph_store::CdcRepository;
use futures::TryStreamExt;

use crate::error::Result;

/// How long to sleep once the event log is drained before polling again.
const IDLE_SLEEP: Duration = Duration::from_secs(10);

/// Long-running publisher of the trigger-populated event log.
///
/// At-least-once: the offset repository checkpoints only after a batch has
/// been published, so a crash between publish and checkpoint republishes
/// events. Downstream consumers tolerate duplicates.
pub struct CdcPublisher {
    cdc: CdcRepository,
    publisher: PublishService,
    rabbit: RabbitConfig,
}

impl CdcPublisher {
    pub fn new(cdc: CdcRepository, publisher: PublishService, rabbit: RabbitConfig) -> Self {
        Self {
            cdc,
            publisher,
            rabbit,
        }
    }

    pub async fn run(&self) -> Result<()> {
        loop {
            tracing::info!("polling event log for new events");

            let connection = depgraph_broker::connect(&self.rabbit).await?;
            let channel = connection.create_channel().await?;

            let events = self.cdc.stream_event_log(false, true);
            futures::pin_mut!(events);
            while let Some(event) = events.try_next().await? {
                tracing::debug!(event_id = event.event_id, table = %event.table, "publishing event");
                self.publisher
                    .publish_cdc_event_log_entry(&event, Some(&channel))
                    .await?;
            }

            let _ = connection.close(200, "").await;

            tracing::info!("event log drained, waiting");
            tokio::time::sleep(IDLE_SLEEP).await;
        }
    }
}
