//! One-shot loader of the most-downloaded packages.

use depgraph_broker::PublishService;
use depgraph_core::config::{BatchConfig, PostgresConfig, RabbitConfig};
use depgraph_core::models::PackageNameMessage;
use depgraph_store::PackageNameRepository;

use crate::bootstrap;
use crate::error::Result;

pub async fn run() -> Result<()> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;
    let batch = BatchConfig::from_env()?;

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;
    let package_names = PackageNameRepository::new(pool, batch.iter_batch_size);

    let pypi = depgraph_pypi::PypiClient::new(bootstrap::http_client()?);

    tracing::info!("initializing broker session");
    let connection = depgraph_broker::connect(&rabbit).await?;
    let channel = connection.create_channel().await?;
    depgraph_broker::declare_topology(&channel, &rabbit).await?;
    let publisher = PublishService::new(rabbit);

    tracing::info!("fetching list of top packages");
    let popular = pypi.get_popular_packages().await?;
    let names: Vec<String> = popular
        .into_iter()
        .map(|package| package.package_name)
        .collect();

    tracing::info!(count = names.len(), "inserting package names");
    package_names.insert_names(&names, false).await?;

    tracing::info!(count = names.len(), "publishing package names");
    for name in names {
        publisher
            .publish_package_name(&PackageNameMessage::Name(name), Some(&channel))
            .await?;
    }

    let _ = connection.close(200, "").await;
    Ok(())
}
