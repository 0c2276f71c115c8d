//! Record types shared by the repositories, the broker payloads, and the
//! processing services.
//!
//! Each type doubles as the canonical JSON codec for its broker message:
//! unknown fields are tolerated on decode and missing optional fields default
//! to `None`, so payloads produced by older workers stay readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A package name known to the crawl front.
///
/// `date_last_checked` is bumped after every successful enumeration of the
/// package's versions and distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageName {
    pub package_name: String,
    pub date_discovered: Option<DateTime<Utc>>,
    pub date_last_checked: Option<DateTime<Utc>>,
}

impl PackageName {
    /// A fresh record for a name seen for the first time.
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            date_discovered: None,
            date_last_checked: None,
        }
    }
}

/// Package-name messages arrive either as a full record or as a bare JSON
/// string holding the canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageNameMessage {
    Record(PackageName),
    Name(String),
}

impl PackageNameMessage {
    pub fn name(&self) -> &str {
        match self {
            Self::Record(record) => &record.package_name,
            Self::Name(name) => name,
        }
    }
}

impl From<PackageName> for PackageNameMessage {
    fn from(record: PackageName) -> Self {
        Self::Record(record)
    }
}

impl From<String> for PackageNameMessage {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// One version of a package, with its PEP 440 decomposition.
///
/// The parsed columns are best-effort: a version string the parser rejects
/// leaves them all `None`, and any integer term beyond the bigint ceiling
/// nulls its column while `package_version` stays authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: Option<Uuid>,
    pub package_name: String,
    pub package_version: String,
    pub date_discovered: Option<DateTime<Utc>>,

    pub epoch: Option<i64>,
    pub package_release: Option<Vec<i64>>,
    pub pre_0: Option<String>,
    pub pre_1: Option<i64>,
    pub post: Option<i64>,
    pub dev: Option<i64>,
    pub local: Option<String>,
    pub is_prerelease: Option<bool>,
    pub is_postrelease: Option<bool>,
    pub is_devrelease: Option<bool>,
}

impl Version {
    /// A version record carrying only its identity, parsed fields unset.
    pub fn new(package_name: impl Into<String>, package_version: impl Into<String>) -> Self {
        Self {
            version_id: None,
            package_name: package_name.into(),
            package_version: package_version.into(),
            date_discovered: None,
            epoch: None,
            package_release: None,
            pre_0: None,
            pre_1: None,
            post: None,
            dev: None,
            local: None,
            is_prerelease: None,
            is_postrelease: None,
            is_devrelease: None,
        }
    }
}

/// A downloadable artifact of a (package, version) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub distribution_id: Option<Uuid>,
    pub version_id: Option<Uuid>,
    pub package_type: String,
    pub python_version: String,
    pub requires_python: Option<String>,
    pub upload_time: DateTime<Utc>,
    pub yanked: bool,
    pub package_filename: String,
    pub package_url: String,
    pub processed: bool,
    pub metadata_file_size: Option<i64>,
}

/// A single `Requires-Dist` entry extracted from a distribution's metadata.
///
/// `extras` carries the environment-marker expression, `dependency_extras`
/// the comma-joined extras requested of the dependency. When the source line
/// could not be parsed, `parsable` is false and the raw text is preserved in
/// `dependency_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub requirement_id: Option<Uuid>,
    pub distribution_id: Uuid,
    pub extras: Option<String>,
    pub dependency_name: String,
    pub dependency_extras: Option<String>,
    pub version_constraint: Option<String>,
    pub dependency_extras_arr: Option<Vec<String>>,
    #[serde(skip)]
    pub parsable: bool,
}

/// The versions of a dependency known to satisfy one requirement, ranked by
/// version precedence. `candidate_versions[i]` and `candidate_version_ids[i]`
/// describe the same version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub requirement_id: Uuid,
    pub candidate_versions: Vec<String>,
    pub candidate_version_ids: Vec<Uuid>,
}

/// Row-level operation recorded by the CDC triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CdcOperation {
    Insert,
    Update,
    Delete,
}

/// One entry of the trigger-populated event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub event_id: i64,
    pub operation: CdcOperation,
    pub schema: String,
    pub table: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_message_decodes_bare_string() {
        let message: PackageNameMessage = serde_json::from_str("\"flask\"").unwrap();
        assert_eq!(message, PackageNameMessage::Name("flask".into()));
        assert_eq!(message.name(), "flask");
    }

    #[test]
    fn test_package_name_message_decodes_record() {
        let json = r#"{"package_name": "flask", "date_discovered": null, "date_last_checked": null}"#;
        let message: PackageNameMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.name(), "flask");
        assert!(matches!(message, PackageNameMessage::Record(_)));
    }

    #[test]
    fn test_package_name_message_tolerates_missing_dates() {
        let message: PackageNameMessage =
            serde_json::from_str(r#"{"package_name": "flask"}"#).unwrap();
        assert_eq!(message.name(), "flask");
    }

    #[test]
    fn test_requirement_codec_omits_parsable() {
        let requirement = Requirement {
            requirement_id: Some(Uuid::nil()),
            distribution_id: Uuid::nil(),
            extras: Some(String::new()),
            dependency_name: "bar".into(),
            dependency_extras: Some(String::new()),
            version_constraint: Some(">=1,<2".into()),
            dependency_extras_arr: Some(vec![]),
            parsable: true,
        };

        let value = serde_json::to_value(&requirement).unwrap();
        assert!(value.get("parsable").is_none());
        assert_eq!(value["dependency_name"], "bar");

        let decoded: Requirement = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.version_constraint.as_deref(), Some(">=1,<2"));
        assert!(!decoded.parsable);
    }

    #[test]
    fn test_event_log_entry_operation_codec() {
        let json = r#"{
            "event_id": 43,
            "operation": "INSERT",
            "schema": "pypi_packages",
            "table": "requirements",
            "before": null,
            "after": {"requirement_id": "00000000-0000-0000-0000-000000000000"},
            "timestamp": "2024-06-01T00:00:00Z"
        }"#;

        let event: EventLogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(event.operation, CdcOperation::Insert);
        assert_eq!(event.table, "requirements");
        assert!(event.after.is_some());
    }
}
