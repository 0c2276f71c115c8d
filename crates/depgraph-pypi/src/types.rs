//! Response shapes returned by the client.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Everything the legacy JSON endpoint reports for one package: a map from
/// version string to the distribution files uploaded for it. Carries no
/// database identifiers; the processing service projects these onto rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDistributionsResponse {
    pub versions: HashMap<String, Vec<DistributionFile>>,
}

/// One uploaded file of a release, as the legacy endpoint describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionFile {
    pub package_type: String,
    pub python_version: String,
    pub requires_python: Option<String>,
    pub upload_time: DateTime<Utc>,
    pub yanked: bool,
    pub package_filename: String,
    pub package_url: String,
}

/// Entry of the top-pypi-packages download ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct PopularPackage {
    pub package_name: String,
    pub download_count: i64,
}
