//! Extracting requirements from a distribution's metadata sidecar.

use std::collections::BTreeSet;

use depgraph_broker::PublishService;
use depgraph_core::canonicalize_name;
use depgraph_core::config::ProcessorConfig;
use depgraph_core::models::{Distribution, Requirement};
use depgraph_pypi::PypiClient;
use depgraph_store::{
    DistributionFilter, DistributionRepository, PackageNameRepository, RequirementRepository,
};
use futures::TryStreamExt;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Processes distribution messages into requirement rows.
pub struct DistributionProcessor {
    pool: PgPool,
    package_names: PackageNameRepository,
    distributions: DistributionRepository,
    requirements: RequirementRepository,
    pypi: PypiClient,
    config: ProcessorConfig,
    publisher: Option<PublishService>,
}

impl DistributionProcessor {
    pub fn new(
        pool: PgPool,
        package_names: PackageNameRepository,
        distributions: DistributionRepository,
        requirements: RequirementRepository,
        pypi: PypiClient,
        config: ProcessorConfig,
        publisher: Option<PublishService>,
    ) -> Self {
        Self {
            pool,
            package_names,
            distributions,
            requirements,
            pypi,
            config,
            publisher,
        }
    }

    /// Process one distribution.
    ///
    /// Fetches the metadata sidecar and, in one transaction, replaces the
    /// distribution's requirement set, optionally discovers new package
    /// names, records the sidecar size, and flips `processed`. Distributions
    /// without a sidecar (non-wheels, missing files) are marked processed
    /// with size zero.
    pub async fn process(&self, distribution: &Distribution) -> Result<()> {
        let distribution_id = distribution.distribution_id.ok_or(PipelineError::MissingId {
            entity: "distribution",
        })?;

        if !self.config.ignore_processed_flag && distribution.processed {
            tracing::debug!(%distribution_id, "already processed");
            return Ok(());
        }

        tracing::info!(%distribution_id, "getting requirements");
        let (metadata, metadata_file_size) =
            self.pypi.get_distribution_metadata(distribution).await?;

        let Some(metadata) = metadata else {
            tracing::debug!(%distribution_id, "no metadata information found");
            let mut updated = distribution.clone();
            updated.metadata_file_size = Some(0);
            updated.processed = true;
            self.distributions
                .update_distributions(std::slice::from_ref(&updated))
                .await?;
            return Ok(());
        };

        let requirements: Vec<Requirement> = metadata
            .requires_dist
            .iter()
            .map(|raw| match convert_requirement(distribution_id, raw) {
                Some(requirement) => requirement,
                None => {
                    tracing::warn!(%distribution_id, requirement = %raw, "unable to parse requirement");
                    fallback_requirement(distribution_id, raw)
                }
            })
            .collect();
        tracing::info!(%distribution_id, count = requirements.len(), "found requirements");

        let mut tx = self.pool.begin().await?;

        self.requirements
            .delete_requirements_of_conn(&mut tx, distribution_id)
            .await?;
        self.requirements
            .insert_requirements_conn(&mut tx, &requirements)
            .await?;

        if self.config.discover_package_names {
            let names: Vec<String> = requirements
                .iter()
                .map(|requirement| requirement.dependency_name.clone())
                .filter(|name| !canonicalize_name(name).is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            tracing::debug!(%distribution_id, count = names.len(), "propagating dependency names");
            let inserted = self
                .package_names
                .insert_names_conn(&mut tx, &names, self.publisher.is_some())
                .await?;

            if let Some(publisher) = &self.publisher
                && !inserted.is_empty()
            {
                tracing::debug!(
                    %distribution_id,
                    count = inserted.len(),
                    "publishing newly discovered package names"
                );
                publisher.publish_package_names(&inserted).await?;
            }
        }

        tracing::debug!(%distribution_id, "marking processed");
        let mut updated = distribution.clone();
        updated.metadata_file_size = Some(metadata_file_size);
        updated.processed = true;
        self.distributions
            .update_distributions_conn(&mut tx, std::slice::from_ref(&updated))
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Sweep every unprocessed distribution in the database.
    pub async fn run_from_database(&self) -> Result<()> {
        let filter = DistributionFilter {
            processed: Some(false),
            ..Default::default()
        };
        let distributions = self.distributions.stream_distributions(filter);
        futures::pin_mut!(distributions);
        while let Some(distribution) = distributions.try_next().await? {
            self.process(&distribution).await?;
        }
        Ok(())
    }
}

/// Convert one `Requires-Dist` value into a requirement row. `None` when the
/// value is not valid PEP 508.
pub fn convert_requirement(distribution_id: Uuid, raw: &str) -> Option<Requirement> {
    let parsed: pep508_rs::Requirement = raw.trim().parse().ok()?;

    let extras: Vec<String> = parsed.extras.iter().map(ToString::to_string).collect();
    let version_constraint = match &parsed.version_or_url {
        Some(pep508_rs::VersionOrUrl::VersionSpecifier(specifiers)) => specifiers.to_string(),
        _ => String::new(),
    };
    let marker = parsed.marker.try_to_string().unwrap_or_default();

    Some(Requirement {
        requirement_id: None,
        distribution_id,
        extras: Some(marker),
        dependency_name: canonicalize_name(&parsed.name.to_string()),
        dependency_extras: Some(extras.join(",")),
        version_constraint: Some(version_constraint),
        dependency_extras_arr: Some(extras),
        parsable: true,
    })
}

/// Best-effort row for a `Requires-Dist` value the parser rejected: the raw
/// text lands in `dependency_name`, everything else stays blank.
pub fn fallback_requirement(distribution_id: Uuid, raw: &str) -> Requirement {
    Requirement {
        requirement_id: None,
        distribution_id,
        extras: Some(String::new()),
        dependency_name: raw.to_string(),
        dependency_extras: Some(String::new()),
        version_constraint: Some(String::new()),
        dependency_extras_arr: Some(Vec::new()),
        parsable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_requirement_with_constraint_and_marker() {
        let requirement =
            convert_requirement(Uuid::nil(), "bar>=1,<2; python_version<\"3.12\"").unwrap();

        assert!(requirement.parsable);
        assert_eq!(requirement.dependency_name, "bar");
        // Specifier rendering may insert spaces after commas; compare modulo
        // whitespace.
        let constraint = requirement.version_constraint.unwrap().replace(' ', "");
        assert_eq!(constraint, ">=1,<2");
        let marker = requirement.extras.unwrap();
        assert!(marker.contains("python_version"));
        assert!(marker.contains("3.12"));
        assert_eq!(requirement.dependency_extras.as_deref(), Some(""));
        assert_eq!(requirement.dependency_extras_arr, Some(Vec::new()));
    }

    #[test]
    fn test_convert_requirement_with_extras() {
        let requirement = convert_requirement(Uuid::nil(), "baz[extra1,extra2]==3.0").unwrap();

        assert_eq!(requirement.dependency_name, "baz");
        assert_eq!(requirement.version_constraint.as_deref(), Some("==3.0"));
        assert_eq!(
            requirement.dependency_extras_arr,
            Some(vec!["extra1".to_string(), "extra2".to_string()])
        );
        assert_eq!(requirement.dependency_extras.as_deref(), Some("extra1,extra2"));
        assert_eq!(requirement.extras.as_deref(), Some(""));
    }

    #[test]
    fn test_convert_requirement_canonicalizes_dependency_name() {
        let requirement = convert_requirement(Uuid::nil(), "Django_Rest.Framework>=3").unwrap();
        assert_eq!(requirement.dependency_name, "django-rest-framework");
    }

    #[test]
    fn test_convert_requirement_rejects_garbage() {
        assert!(convert_requirement(Uuid::nil(), "!!!").is_none());
    }

    #[test]
    fn test_fallback_requirement_preserves_raw_text() {
        let requirement = fallback_requirement(Uuid::nil(), "!!!");
        assert!(!requirement.parsable);
        assert_eq!(requirement.dependency_name, "!!!");
        assert_eq!(requirement.version_constraint.as_deref(), Some(""));
        assert_eq!(requirement.dependency_extras_arr, Some(Vec::new()));
    }
}
