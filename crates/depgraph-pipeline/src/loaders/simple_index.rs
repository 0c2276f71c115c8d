//! One-shot loader of package names from the Simple index.

use depgraph_broker::PublishService;
use depgraph_core::config::{BatchConfig, LoaderConfig, PostgresConfig, RabbitConfig};
use depgraph_core::models::PackageNameMessage;
use depgraph_store::PackageNameRepository;
use regex::Regex;

use crate::bootstrap;
use crate::error::{PipelineError, Result};

pub async fn run() -> Result<()> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;
    let batch = BatchConfig::from_env()?;
    let loader = LoaderConfig::from_env();

    let prefix_regex =
        Regex::new(&loader.package_name_prefix_regex).map_err(|source| {
            PipelineError::InvalidPrefixRegex {
                pattern: loader.package_name_prefix_regex.clone(),
                source,
            }
        })?;

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;
    let package_names = PackageNameRepository::new(pool, batch.iter_batch_size);

    let pypi = depgraph_pypi::PypiClient::new(bootstrap::http_client()?);

    tracing::info!("initializing broker session");
    let connection = depgraph_broker::connect(&rabbit).await?;
    let channel = connection.create_channel().await?;
    depgraph_broker::declare_topology(&channel, &rabbit).await?;
    let publisher = PublishService::new(rabbit);

    tracing::info!(
        pattern = %prefix_regex.as_str(),
        "fetching package list from the simple index"
    );
    let mut scanner = pypi.iter_all_package_names().await?;
    let mut names = Vec::new();
    let mut in_prefix_window = false;
    while let Some(name) = scanner.next_name().await? {
        if prefix_regex.is_match(&name) {
            in_prefix_window = true;
            names.push(name);
        } else if in_prefix_window {
            // The index is alphabetical in practice, so the first non-match
            // after the window ends the scan.
            break;
        }
    }

    tracing::info!(count = names.len(), "inserting package names");
    let inserted = package_names
        .insert_names(&names, loader.count_inserted)
        .await?;

    if loader.count_inserted {
        tracing::info!(new = inserted.len(), "new packages found");
        for record in inserted {
            publisher
                .publish_package_name(&PackageNameMessage::Record(record), Some(&channel))
                .await?;
        }
    }

    tracing::info!(count = names.len(), "publishing package names");
    for name in names {
        publisher
            .publish_package_name(&PackageNameMessage::Name(name), Some(&channel))
            .await?;
    }

    let _ = connection.close(200, "").await;
    Ok(())
}
