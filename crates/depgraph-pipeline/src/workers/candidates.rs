//! Candidate-correlation queue subscriber.

use depgraph_broker::{start_consume_thread, topology};
use depgraph_core::config::{PostgresConfig, RabbitConfig};
use depgraph_core::models::Requirement;
use depgraph_store::{CandidateRepository, VersionRepository};

use crate::error::Result;
use crate::services::CandidateCorrelator;

/// Consume requirement messages and correlate each with its candidate
/// versions.
pub async fn run() -> Result<()> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;

    tracing::info!("initializing repositories");
    let versions = VersionRepository::new(pool.clone());
    let candidates = CandidateRepository::new(pool);
    let correlator = CandidateCorrelator::new(versions, candidates);

    tracing::info!("starting consumer thread");
    let mut subscription = start_consume_thread::<Requirement>(
        rabbit.clone(),
        topology::CANDIDATE_CORRELATION_QUEUE,
        rabbit.candidate_correlation_prefetch,
    )?;

    tracing::info!("running");
    while let Some(requirement) = subscription.recv().await {
        tracing::debug!(
            requirement_id = ?requirement.requirement_id,
            "correlating candidates for requirement"
        );
        match correlator.process(&requirement).await {
            Ok(()) => subscription.ack(true).await,
            Err(error) => {
                tracing::error!(
                    %error,
                    requirement_id = ?requirement.requirement_id,
                    "error while handling requirement message"
                );
                subscription.ack(false).await;
                return Err(error);
            }
        }
    }

    Ok(())
}
