//! Publishing domain records to the topic exchange.

use depgraph_core::config::RabbitConfig;
use depgraph_core::models::{Distribution, EventLogEntry, PackageName, PackageNameMessage, Requirement};
use lapin::{BasicProperties, Channel, options::BasicPublishOptions};
use serde::Serialize;

use crate::error::{BrokerError, Result};
use crate::routing;
use crate::topology;

/// Converts records to their canonical JSON and publishes them on
/// deterministic routing keys.
///
/// Every method accepts an optional caller-supplied channel; without one, a
/// connection and channel are opened and closed around the publish. Bulk
/// variants always hold one channel for the whole batch.
pub struct PublishService {
    config: RabbitConfig,
}

impl PublishService {
    pub fn new(config: RabbitConfig) -> Self {
        Self { config }
    }

    pub async fn publish_package_name(
        &self,
        message: &PackageNameMessage,
        channel: Option<&Channel>,
    ) -> Result<()> {
        let routing_key = routing::package_name_key(message.name());
        self.publish(channel, &routing_key, message).await
    }

    pub async fn publish_package_names(&self, records: &[PackageName]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let (connection, channel) = self.open_channel().await?;
        for record in records {
            let routing_key = routing::package_name_key(&record.package_name);
            self.publish(Some(&channel), &routing_key, record).await?;
        }
        let _ = connection.close(200, "").await;
        Ok(())
    }

    pub async fn publish_distribution(
        &self,
        distribution: &Distribution,
        channel: Option<&Channel>,
    ) -> Result<()> {
        let distribution_id = distribution.distribution_id.ok_or(BrokerError::MissingId {
            entity: "distribution",
        })?;
        let routing_key = routing::distribution_key(distribution_id);
        self.publish(channel, &routing_key, distribution).await
    }

    pub async fn publish_distributions(&self, distributions: &[Distribution]) -> Result<()> {
        if distributions.is_empty() {
            return Ok(());
        }
        let (connection, channel) = self.open_channel().await?;
        for distribution in distributions {
            self.publish_distribution(distribution, Some(&channel)).await?;
        }
        let _ = connection.close(200, "").await;
        Ok(())
    }

    pub async fn publish_requirement_for_reprocessing(
        &self,
        requirement: &Requirement,
        channel: Option<&Channel>,
    ) -> Result<()> {
        let routing_key = routing::requirement_reprocess_key(requirement.distribution_id);
        self.publish(channel, &routing_key, requirement).await
    }

    pub async fn publish_requirement_for_candidate_correlation(
        &self,
        requirement: &Requirement,
        channel: Option<&Channel>,
    ) -> Result<()> {
        let requirement_id = requirement.requirement_id.ok_or(BrokerError::MissingId {
            entity: "requirement",
        })?;
        let routing_key = routing::requirement_correlate_key(requirement_id);
        self.publish(channel, &routing_key, requirement).await
    }

    pub async fn publish_cdc_event_log_entry(
        &self,
        event: &EventLogEntry,
        channel: Option<&Channel>,
    ) -> Result<()> {
        let routing_key = routing::cdc_event_key(event);
        self.publish(channel, &routing_key, event).await
    }

    async fn publish<T: Serialize>(
        &self,
        channel: Option<&Channel>,
        routing_key: &str,
        record: &T,
    ) -> Result<()> {
        let payload = serde_json::to_vec(record)?;

        if let Some(channel) = channel {
            return self.basic_publish(channel, routing_key, &payload).await;
        }

        let (connection, channel) = self.open_channel().await?;
        let result = self.basic_publish(&channel, routing_key, &payload).await;
        let _ = connection.close(200, "").await;
        result
    }

    async fn basic_publish(
        &self,
        channel: &Channel,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<()> {
        tracing::debug!(routing_key, "publishing message");
        channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn open_channel(&self) -> Result<(lapin::Connection, Channel)> {
        let connection = topology::connect(&self.config).await?;
        let channel = connection.create_channel().await?;
        Ok((connection, channel))
    }
}
