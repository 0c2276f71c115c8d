//! Requirement reprocessing: normalizing `dependency_extras_arr` from the
//! stored comma-joined `dependency_extras`.
//!
//! Two paths to the same rewrite: a queue subscriber fed by the
//! reprocess-requirements routing keys, and a hashmod-sharded sweep straight
//! over the database for bulk backfills.

use depgraph_broker::{start_consume_thread, topology};
use depgraph_core::config::{BatchConfig, PostgresConfig, RabbitConfig, ShardConfig};
use depgraph_core::models::Requirement;
use depgraph_store::{HashModFilter, RequirementFilter, RequirementRepository};
use futures::TryStreamExt;

use crate::error::Result;

/// Consume requirement messages and rewrite each row's extras array.
pub async fn run() -> Result<()> {
    let postgres = PostgresConfig::from_env()?;
    let rabbit = RabbitConfig::from_env()?;
    let batch = BatchConfig::from_env()?;

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;
    let requirements = RequirementRepository::new(pool, batch.iter_batch_size);

    tracing::info!("starting consumer thread");
    let mut subscription = start_consume_thread::<Requirement>(
        rabbit.clone(),
        topology::REPROCESS_REQUIREMENTS_QUEUE,
        rabbit.reprocess_requirements_prefetch,
    )?;

    tracing::info!("running");
    while let Some(mut requirement) = subscription.recv().await {
        normalize(&mut requirement);
        tracing::info!(
            requirement_id = ?requirement.requirement_id,
            "updating requirement"
        );
        match requirements.update_requirement(&requirement).await {
            Ok(()) => subscription.ack(true).await,
            Err(error) => {
                tracing::error!(
                    %error,
                    requirement_id = ?requirement.requirement_id,
                    "error while handling requirement message"
                );
                subscription.ack(false).await;
                return Err(error.into());
            }
        }
    }

    Ok(())
}

/// Sweep this worker's hashmod shard of the requirements table, committing
/// every `COMMIT_BATCH_SIZE` updates.
pub async fn run_db_sweep() -> Result<()> {
    let postgres = PostgresConfig::from_env()?;
    let batch = BatchConfig::from_env()?;
    let shard = ShardConfig::from_env()?;

    tracing::info!("initializing database pool");
    let pool = depgraph_store::connect(&postgres).await?;
    let requirements = RequirementRepository::new(pool.clone(), batch.iter_batch_size);

    let filter = RequirementFilter {
        dependency_extras_arr_is_null: Some(true),
        hashmod: Some(HashModFilter::from(&shard)),
        ..Default::default()
    };
    tracing::info!(
        hash_alg = %shard.hash_alg,
        mod_base = shard.mod_base,
        mod_filter = shard.mod_filter,
        "iterating requirements in this shard"
    );

    let stream = requirements.stream_requirements(filter);
    futures::pin_mut!(stream);

    let mut tx = pool.begin().await?;
    let mut updated = 0usize;
    while let Some(mut requirement) = stream.try_next().await? {
        normalize(&mut requirement);
        requirements
            .update_requirement_conn(&mut tx, &requirement)
            .await?;
        updated += 1;
        if updated % batch.commit_batch_size == 0 {
            tx.commit().await?;
            tracing::info!(updated, "committed batch");
            tx = pool.begin().await?;
        }
    }
    tx.commit().await?;
    tracing::info!(updated, "sweep complete");

    Ok(())
}

fn normalize(requirement: &mut Requirement) {
    if requirement.extras.is_none() {
        requirement.extras = Some(String::new());
    }
    requirement.dependency_extras_arr =
        Some(split_extras(requirement.dependency_extras.as_deref()));
}

fn split_extras(dependency_extras: Option<&str>) -> Vec<String> {
    match dependency_extras {
        Some(extras) if !extras.is_empty() => extras.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_split_extras() {
        assert_eq!(
            split_extras(Some("extra1,extra2")),
            vec!["extra1".to_string(), "extra2".to_string()]
        );
        assert_eq!(split_extras(Some("")), Vec::<String>::new());
        assert_eq!(split_extras(None), Vec::<String>::new());
    }

    #[test]
    fn test_normalize_fills_blank_extras_and_array() {
        let mut requirement = Requirement {
            requirement_id: Some(Uuid::nil()),
            distribution_id: Uuid::nil(),
            extras: None,
            dependency_name: "bar".into(),
            dependency_extras: Some("extra1".into()),
            version_constraint: None,
            dependency_extras_arr: None,
            parsable: true,
        };

        normalize(&mut requirement);
        assert_eq!(requirement.extras.as_deref(), Some(""));
        assert_eq!(
            requirement.dependency_extras_arr,
            Some(vec!["extra1".to_string()])
        );
    }
}
