//! One-shot loader pushing stored records back onto their queues.
//!
//! Each record kind is gated by its `UPL_*` flag, so the same command can
//! re-seed the crawl front, retry unprocessed distributions, queue
//! incomplete requirements for reprocessing, or queue every requirement for
//! candidate correlation.

use depgraph_broker::PublishService;
use depgraph_core::config::{BatchConfig, LoaderConfig, PostgresConfig, RabbitConfig};
use depgraph_core::models::PackageNameMessage;
use depgraph_store::{
    DistributionFilter, DistributionRepository, PackageNameRepository, RequirementFilter,
    RequirementRepository,
};
use futures::TryStreamExt;

use crate::error::Result;

pub async fn run() -> Result<()> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;
    let batch = BatchConfig::from_env()?;
    let loader = LoaderConfig::from_env();

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;

    tracing::info!("initializing repositories");
    let package_names = PackageNameRepository::new(pool.clone(), batch.iter_batch_size);
    let distributions = DistributionRepository::new(pool.clone(), batch.iter_batch_size);
    let requirements = RequirementRepository::new(pool, batch.iter_batch_size);

    tracing::info!("initializing broker session");
    let connection = depgraph_broker::connect(&rabbit).await?;
    let channel = connection.create_channel().await?;
    depgraph_broker::declare_topology(&channel, &rabbit).await?;
    let publisher = PublishService::new(rabbit);

    if loader.load_distributions {
        tracing::info!("loading distributions into the broker");
        let filter = DistributionFilter {
            processed: loader.only_load_unprocessed_distributions.then_some(false),
            package_name: None,
            only_bdist_wheel: loader.only_load_bdist_wheel_distributions,
        };
        let stream = distributions.stream_distributions(filter);
        futures::pin_mut!(stream);
        while let Some(distribution) = stream.try_next().await? {
            tracing::debug!(
                distribution_id = ?distribution.distribution_id,
                "loading distribution"
            );
            publisher
                .publish_distribution(&distribution, Some(&channel))
                .await?;
        }
    }

    if loader.load_package_names {
        tracing::info!("loading all package names into the broker");
        let stream = package_names.stream_names(None);
        futures::pin_mut!(stream);
        while let Some(record) = stream.try_next().await? {
            tracing::debug!(package_name = %record.package_name, "loading package name");
            publisher
                .publish_package_name(&PackageNameMessage::Record(record), Some(&channel))
                .await?;
        }
    }

    if loader.load_incomplete_requirements {
        tracing::info!("loading incomplete requirements for reprocessing");
        let filter = RequirementFilter {
            dependency_extras_arr_is_null: Some(true),
            ..Default::default()
        };
        let stream = requirements.stream_requirements(filter);
        futures::pin_mut!(stream);
        while let Some(requirement) = stream.try_next().await? {
            publisher
                .publish_requirement_for_reprocessing(&requirement, Some(&channel))
                .await?;
        }
    }

    if loader.load_requirements_for_candidate_correlation {
        tracing::info!("loading requirements for candidate correlation");
        let stream = requirements.stream_requirements(RequirementFilter::default());
        futures::pin_mut!(stream);
        while let Some(requirement) = stream.try_next().await? {
            publisher
                .publish_requirement_for_candidate_correlation(&requirement, Some(&channel))
                .await?;
        }
    }

    let _ = connection.close(200, "").await;
    Ok(())
}
