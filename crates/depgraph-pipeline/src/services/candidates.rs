//! Matching requirements with the dependency versions that satisfy them.

use std::str::FromStr;

use depgraph_core::models::{Candidate, Requirement, Version};
use depgraph_store::{CandidateRepository, VersionRepository};
use pep440_rs::VersionSpecifiers;

use crate::error::{PipelineError, Result};

/// Maintains the `candidates` table: for each requirement, the dependency's
/// known versions that satisfy its specifier set, ranked newest first.
pub struct CandidateCorrelator {
    versions: VersionRepository,
    candidates: CandidateRepository,
}

impl CandidateCorrelator {
    pub fn new(versions: VersionRepository, candidates: CandidateRepository) -> Self {
        Self {
            versions,
            candidates,
        }
    }

    /// Correlate one requirement.
    ///
    /// Most malformed inputs fail silently here: pip would choke on those
    /// specifier sets and version strings too. Database errors are genuine
    /// failures and propagate.
    pub async fn process(&self, requirement: &Requirement) -> Result<()> {
        // Metadata files with a blank Requires-Dist entry produce rows with
        // an empty dependency name; nothing to correlate.
        if requirement.dependency_name.trim().is_empty() {
            return Ok(());
        }

        let constraint = requirement.version_constraint.clone().unwrap_or_default();
        let specifiers = match VersionSpecifiers::from_str(&constraint) {
            Ok(specifiers) => specifiers,
            Err(error) => {
                tracing::warn!(
                    %error,
                    version_constraint = %constraint,
                    "error while parsing specifier set"
                );
                return Ok(());
            }
        };

        let versions = self
            .versions
            .list_versions(Some(&requirement.dependency_name), None)
            .await?;
        let ranked = select_candidates(&versions, &specifiers);

        let requirement_id = requirement.requirement_id.ok_or(PipelineError::MissingId {
            entity: "requirement",
        })?;

        let mut candidate_versions = Vec::with_capacity(ranked.len());
        let mut candidate_version_ids = Vec::with_capacity(ranked.len());
        for version in ranked {
            let version_id = version.version_id.ok_or(PipelineError::MissingId {
                entity: "version",
            })?;
            candidate_versions.push(version.package_version.clone());
            candidate_version_ids.push(version_id);
        }

        self.candidates
            .upsert_candidate(&Candidate {
                requirement_id,
                candidate_versions,
                candidate_version_ids,
            })
            .await?;

        Ok(())
    }
}

/// Filter `versions` through the specifier set and rank them descending by
/// version precedence.
///
/// The evaluator needs typed versions, so each raw string is parsed first;
/// strings the parser rejects are dropped individually while the returned
/// records keep the original representation the database stores.
///
/// Pre-release and dev versions follow pip's specifier-filtering rules: they
/// are excluded unless the specifier set itself references a pre-release, or
/// no final version satisfies the set at all, in which case the matching
/// pre-releases stand in.
pub fn select_candidates<'a>(
    versions: &'a [Version],
    specifiers: &VersionSpecifiers,
) -> Vec<&'a Version> {
    let prereleases_allowed = specifiers
        .iter()
        .any(|specifier| specifier.version().any_prerelease());

    let mut matched: Vec<(pep440_rs::Version, &Version)> = Vec::new();
    let mut matched_prereleases: Vec<(pep440_rs::Version, &Version)> = Vec::new();
    for version in versions {
        let parsed = match pep440_rs::Version::from_str(&version.package_version) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    %error,
                    package_version = %version.package_version,
                    "error while parsing version"
                );
                continue;
            }
        };
        if !specifiers.contains(&parsed) {
            continue;
        }
        if parsed.any_prerelease() && !prereleases_allowed {
            matched_prereleases.push((parsed, version));
        } else {
            matched.push((parsed, version));
        }
    }

    if matched.is_empty() {
        matched = matched_prereleases;
    }
    matched.sort_by(|a, b| b.0.cmp(&a.0));
    matched.into_iter().map(|(_, version)| version).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn version(package_version: &str) -> Version {
        let mut version = Version::new("bar", package_version);
        version.version_id = Some(Uuid::new_v4());
        version
    }

    #[test]
    fn test_select_candidates_filters_and_ranks_descending() {
        let versions = vec![
            version("0.9"),
            version("1.0"),
            version("1.5"),
            version("2.0"),
        ];
        let specifiers = VersionSpecifiers::from_str(">=1,<2").unwrap();

        let ranked = select_candidates(&versions, &specifiers);
        let ranked: Vec<&str> = ranked
            .iter()
            .map(|version| version.package_version.as_str())
            .collect();
        assert_eq!(ranked, vec!["1.5", "1.0"]);
    }

    #[test]
    fn test_select_candidates_drops_unparsable_versions() {
        let versions = vec![version("1.0"), version("not-a-version"), version("1.2")];
        let specifiers = VersionSpecifiers::from_str(">=1").unwrap();

        let ranked = select_candidates(&versions, &specifiers);
        let ranked: Vec<&str> = ranked
            .iter()
            .map(|version| version.package_version.as_str())
            .collect();
        assert_eq!(ranked, vec!["1.2", "1.0"]);
    }

    #[test]
    fn test_empty_specifier_set_matches_everything() {
        let versions = vec![version("2.0"), version("1.0")];
        let specifiers = VersionSpecifiers::from_str("").unwrap();

        let ranked = select_candidates(&versions, &specifiers);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].package_version, "2.0");
    }

    #[test]
    fn test_prereleases_are_excluded_by_default() {
        let versions = vec![
            version("1.0"),
            version("1.5rc1"),
            version("1.5"),
            version("2.0.dev1"),
        ];
        let specifiers = VersionSpecifiers::from_str(">=1").unwrap();

        let ranked = select_candidates(&versions, &specifiers);
        let ranked: Vec<&str> = ranked
            .iter()
            .map(|version| version.package_version.as_str())
            .collect();
        assert_eq!(ranked, vec!["1.5", "1.0"]);
    }

    #[test]
    fn test_prerelease_specifier_admits_prereleases() {
        let versions = vec![version("1.0"), version("1.5rc1")];
        let specifiers = VersionSpecifiers::from_str(">=1.0rc1").unwrap();

        let ranked = select_candidates(&versions, &specifiers);
        let ranked: Vec<&str> = ranked
            .iter()
            .map(|version| version.package_version.as_str())
            .collect();
        assert_eq!(ranked, vec!["1.5rc1", "1.0"]);
    }

    #[test]
    fn test_prereleases_stand_in_when_no_final_version_matches() {
        let versions = vec![version("1.0a1"), version("1.0b2")];
        let specifiers = VersionSpecifiers::from_str(">=0").unwrap();

        let ranked = select_candidates(&versions, &specifiers);
        let ranked: Vec<&str> = ranked
            .iter()
            .map(|version| version.package_version.as_str())
            .collect();
        assert_eq!(ranked, vec!["1.0b2", "1.0a1"]);
    }
}
