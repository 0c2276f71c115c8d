//! Enumerating a package's versions and distributions from the legacy
//! endpoint.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use depgraph_broker::PublishService;
use depgraph_core::models::{Distribution, PackageNameMessage, Version};
use depgraph_core::parsing::{ParsedVersion, parse_version};
use depgraph_pypi::PypiClient;
use depgraph_store::{DistributionRepository, PackageNameRepository, VersionRepository};
use futures::TryStreamExt;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// How recently a name must have been checked before it is skipped.
fn recheck_interval() -> Duration {
    Duration::hours(1)
}

/// Processes package-name messages into version and distribution rows.
pub struct PackageNameProcessor {
    pool: PgPool,
    package_names: PackageNameRepository,
    versions: VersionRepository,
    distributions: DistributionRepository,
    pypi: PypiClient,
    publisher: Option<PublishService>,
}

impl PackageNameProcessor {
    pub fn new(
        pool: PgPool,
        package_names: PackageNameRepository,
        versions: VersionRepository,
        distributions: DistributionRepository,
        pypi: PypiClient,
        publisher: Option<PublishService>,
    ) -> Self {
        Self {
            pool,
            package_names,
            versions,
            distributions,
            pypi,
            publisher,
        }
    }

    /// Process one package name.
    ///
    /// Looks the name up (inserting it on first sighting), skips it when it
    /// was checked within the last hour unless `ignore_date_last_checked`,
    /// then fetches the legacy endpoint and, in one transaction, upserts
    /// versions, inserts distributions (publishing the newly inserted subset
    /// when a publisher is attached), and touches `date_last_checked`.
    pub async fn process(
        &self,
        message: &PackageNameMessage,
        ignore_date_last_checked: bool,
    ) -> Result<()> {
        tracing::info!(package_name = message.name(), "processing package name");

        let mut record = match self.package_names.get(message.name()).await? {
            Some(record) => record,
            None => {
                self.package_names
                    .insert_names(&[message.name().to_string()], false)
                    .await?;
                self.package_names.get(message.name()).await?.ok_or_else(|| {
                    PipelineError::PackageNameRoundTrip {
                        package_name: message.name().to_string(),
                    }
                })?
            }
        };

        let now = Utc::now();
        let due = ignore_date_last_checked
            || record
                .date_last_checked
                .is_none_or(|checked| checked < now - recheck_interval());
        if !due {
            return Ok(());
        }

        tracing::info!(
            package_name = %record.package_name,
            "getting version/distribution information"
        );
        let Some(response) = self
            .pypi
            .get_package_distributions_legacy(&record.package_name)
            .await?
        else {
            tracing::debug!(package_name = %record.package_name, "marking package checked");
            record.date_last_checked = Some(now);
            self.package_names
                .touch(std::slice::from_ref(&record))
                .await?;
            return Ok(());
        };

        let mut versions: Vec<Version> = response
            .versions
            .keys()
            .map(|version_string| Version::new(&record.package_name, version_string))
            .collect();
        for version in &mut versions {
            match parse_version(&version.package_version) {
                Some(parsed) => apply_parsed_fields(version, &parsed),
                None => tracing::warn!(
                    package_name = %record.package_name,
                    package_version = %version.package_version,
                    "error parsing version"
                ),
            }
        }

        let mut tx = self.pool.begin().await?;

        tracing::debug!(package_name = %record.package_name, "saving version information");
        self.versions.insert_versions_conn(&mut tx, &versions).await?;

        tracing::debug!(package_name = %record.package_name, "building version id map");
        let version_ids: HashMap<String, Uuid> = self
            .versions
            .list_versions_conn(&mut tx, Some(&record.package_name), None)
            .await?
            .into_iter()
            .filter_map(|version| {
                version
                    .version_id
                    .map(|version_id| (version.package_version, version_id))
            })
            .collect();

        let mut distributions = Vec::new();
        for (version_string, files) in response.versions {
            let version_id =
                *version_ids
                    .get(&version_string)
                    .ok_or_else(|| PipelineError::MissingVersionId {
                        package_name: record.package_name.clone(),
                        package_version: version_string.clone(),
                    })?;
            for file in files {
                distributions.push(Distribution {
                    distribution_id: None,
                    version_id: Some(version_id),
                    package_type: file.package_type,
                    python_version: file.python_version,
                    requires_python: file.requires_python,
                    upload_time: file.upload_time,
                    yanked: file.yanked,
                    package_filename: file.package_filename,
                    package_url: file.package_url,
                    processed: false,
                    metadata_file_size: None,
                });
            }
        }

        tracing::debug!(package_name = %record.package_name, "saving distribution information");
        let inserted = self
            .distributions
            .insert_distributions_conn(&mut tx, &distributions, self.publisher.is_some())
            .await?;

        if let Some(publisher) = &self.publisher
            && !inserted.is_empty()
        {
            tracing::debug!(
                package_name = %record.package_name,
                count = inserted.len(),
                "publishing new distributions"
            );
            publisher.publish_distributions(&inserted).await?;
        }

        tracing::debug!(package_name = %record.package_name, "marking package checked");
        record.date_last_checked = Some(now);
        self.package_names
            .touch_conn(&mut tx, std::slice::from_ref(&record))
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Sweep every name in the database whose last check is stale.
    pub async fn run_from_database(&self) -> Result<()> {
        let cutoff = Utc::now() - recheck_interval();
        let names = self.package_names.stream_names(Some(cutoff));
        futures::pin_mut!(names);
        while let Some(record) = names.try_next().await? {
            self.process(&PackageNameMessage::Record(record), true).await?;
        }
        Ok(())
    }

    /// Make names discovered through requirements crawl targets themselves.
    pub async fn propagate_discovered_package_names(&self) -> Result<()> {
        tracing::info!("propagating dependency names back to package_names");
        self.package_names.propagate_dependency_names().await?;
        Ok(())
    }
}

fn apply_parsed_fields(version: &mut Version, parsed: &ParsedVersion) {
    version.epoch = parsed.epoch;
    version.package_release = parsed.release.clone();
    version.pre_0 = parsed.pre.as_ref().map(|(kind, _)| kind.clone());
    version.pre_1 = parsed.pre.as_ref().map(|(_, number)| *number);
    version.post = parsed.post;
    version.dev = parsed.dev;
    version.local = parsed.local.clone();
    version.is_prerelease = Some(parsed.is_prerelease);
    version.is_postrelease = Some(parsed.is_postrelease);
    version.is_devrelease = Some(parsed.is_devrelease);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_parsed_fields_marks_dev_releases() {
        let mut version = Version::new("foo", "2.0.dev1");
        let parsed = parse_version("2.0.dev1").unwrap();
        apply_parsed_fields(&mut version, &parsed);

        assert_eq!(version.is_devrelease, Some(true));
        assert_eq!(version.is_prerelease, Some(true));
        assert_eq!(version.dev, Some(1));
        assert_eq!(version.package_release, Some(vec![2, 0]));
        assert_eq!(version.package_version, "2.0.dev1");
    }

    #[test]
    fn test_apply_parsed_fields_plain_release() {
        let mut version = Version::new("foo", "1.0");
        let parsed = parse_version("1.0").unwrap();
        apply_parsed_fields(&mut version, &parsed);

        assert_eq!(version.is_devrelease, Some(false));
        assert_eq!(version.epoch, Some(0));
        assert_eq!(version.package_release, Some(vec![1, 0]));
    }
}
