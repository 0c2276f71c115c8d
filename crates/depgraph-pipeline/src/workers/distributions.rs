//! Distribution queue subscriber and database sweep.

use depgraph_broker::{PublishService, start_consume_thread, topology};
use depgraph_core::config::{BatchConfig, PostgresConfig, ProcessorConfig, RabbitConfig};
use depgraph_core::models::Distribution;
use depgraph_pypi::PypiClient;
use depgraph_store::{DistributionRepository, PackageNameRepository, RequirementRepository};

use crate::bootstrap;
use crate::error::Result;
use crate::services::DistributionProcessor;

async fn build_processor() -> Result<DistributionProcessor> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;
    let batch = BatchConfig::from_env()?;
    let config = ProcessorConfig::from_env();

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;

    tracing::info!("initializing repositories");
    let package_names = PackageNameRepository::new(pool.clone(), batch.iter_batch_size);
    let distributions = DistributionRepository::new(pool.clone(), batch.iter_batch_size);
    let requirements = RequirementRepository::new(pool.clone(), batch.iter_batch_size);

    let pypi = PypiClient::new(bootstrap::http_client()?);
    let publisher = PublishService::new(rabbit);

    Ok(DistributionProcessor::new(
        pool,
        package_names,
        distributions,
        requirements,
        pypi,
        config,
        Some(publisher),
    ))
}

/// Consume distribution messages and extract each distribution's
/// requirements.
pub async fn run() -> Result<()> {
    let rabbit = RabbitConfig::from_env()?;
    let processor = build_processor().await?;

    tracing::info!("starting consumer thread");
    let mut subscription = start_consume_thread::<Distribution>(
        rabbit.clone(),
        topology::DISTRIBUTIONS_QUEUE,
        rabbit.dists_prefetch,
    )?;

    tracing::info!("running");
    while let Some(distribution) = subscription.recv().await {
        match processor.process(&distribution).await {
            Ok(()) => subscription.ack(true).await,
            Err(error) => {
                tracing::error!(
                    %error,
                    distribution_id = ?distribution.distribution_id,
                    "error while handling distribution message"
                );
                subscription.ack(false).await;
                return Err(error);
            }
        }
    }

    Ok(())
}

/// One-shot sweep over unprocessed distributions straight from the database.
pub async fn run_db() -> Result<()> {
    let processor = build_processor().await?;
    processor.run_from_database().await
}
