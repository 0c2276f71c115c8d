//! Package-name queue subscriber and database sweeps.

use depgraph_broker::{PublishService, start_consume_thread, topology};
use depgraph_core::config::{BatchConfig, PostgresConfig, RabbitConfig};
use depgraph_core::models::PackageNameMessage;
use depgraph_pypi::PypiClient;
use depgraph_store::{DistributionRepository, PackageNameRepository, VersionRepository};

use crate::bootstrap;
use crate::error::Result;
use crate::services::PackageNameProcessor;

async fn build_processor(publish: bool) -> Result<PackageNameProcessor> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;
    let batch = BatchConfig::from_env()?;

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;

    tracing::info!("initializing repositories");
    let package_names = PackageNameRepository::new(pool.clone(), batch.iter_batch_size);
    let versions = VersionRepository::new(pool.clone());
    let distributions = DistributionRepository::new(pool.clone(), batch.iter_batch_size);

    let pypi = PypiClient::new(bootstrap::http_client()?);
    let publisher = publish.then(|| PublishService::new(rabbit));

    Ok(PackageNameProcessor::new(
        pool,
        package_names,
        versions,
        distributions,
        pypi,
        publisher,
    ))
}

/// Consume package-name messages and enumerate each package.
pub async fn run() -> Result<()> {
    let rabbit = RabbitConfig::from_env()?;
    let processor = build_processor(true).await?;

    tracing::info!("starting consumer thread");
    let mut subscription = start_consume_thread::<PackageNameMessage>(
        rabbit.clone(),
        topology::PACKAGE_NAMES_QUEUE,
        rabbit.names_prefetch,
    )?;

    tracing::info!("running");
    while let Some(message) = subscription.recv().await {
        match processor.process(&message, true).await {
            Ok(()) => subscription.ack(true).await,
            Err(error) => {
                tracing::error!(
                    %error,
                    package_name = message.name(),
                    "error while handling package name message"
                );
                subscription.ack(false).await;
                return Err(error);
            }
        }
    }

    Ok(())
}

/// One-shot sweep over stale names straight from the database.
pub async fn run_db() -> Result<()> {
    let processor = build_processor(true).await?;
    processor.run_from_database().await
}

/// One-shot propagation of dependency names into the crawl front.
pub async fn propagate() -> Result<()> {
    let processor = build_processor(false).await?;
    processor.propagate_discovered_package_names().await
}
