//! PyPI endpoint client.
//!
//! Exposes the four surfaces the pipeline crawls:
//! - legacy per-package JSON (<https://pypi.org/pypi/{package}/json>)
//! - Simple index line stream (<https://pypi.org/simple/>)
//! - per-distribution metadata sidecar (`{package_url}.metadata`)
//! - the top-pypi-packages download ranking

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use depgraph_core::canonicalize_name;
use depgraph_core::models::Distribution;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{PypiError, Result};
use crate::metadata::{CoreMetadata, parse_core_metadata};
use crate::simple::SimpleIndexScanner;
use crate::types::{DistributionFile, PackageDistributionsResponse, PopularPackage};

const PYPI_HOST: &str = "https://pypi.org";
const POPULAR_PACKAGES_URL: &str =
    "https://hugovk.github.io/top-pypi-packages/top-pypi-packages-30-days.min.json";

/// Only wheels serve a metadata sidecar next to the archive.
const WHEEL_PACKAGE_TYPE: &str = "bdist_wheel";

/// Client for the PyPI endpoints the pipeline depends on.
///
/// Holds a shared `reqwest::Client`; one instance per process is enough.
#[derive(Clone)]
pub struct PypiClient {
    http: reqwest::Client,
    host: String,
    popular_packages_url: String,
}

impl PypiClient {
    /// Client against the production PyPI host.
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_hosts(http, PYPI_HOST, POPULAR_PACKAGES_URL)
    }

    /// Client against arbitrary hosts, used by tests to point at a local
    /// mock server.
    pub fn with_hosts(
        http: reqwest::Client,
        host: impl Into<String>,
        popular_packages_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            host: host.into(),
            popular_packages_url: popular_packages_url.into(),
        }
    }

    /// Fetch the versions and distribution files of one package from the
    /// legacy JSON endpoint.
    ///
    /// The name is canonicalized before the request. A 404 returns `None`
    /// (unknown package); any other non-2xx status is an error.
    pub async fn get_package_distributions_legacy(
        &self,
        package_name: &str,
    ) -> Result<Option<PackageDistributionsResponse>> {
        let name = canonicalize_name(package_name);
        let url = format!("{}/pypi/{}/json", self.host, name);

        tracing::info!(package_name = %name, "fetching version/distribution information");

        let response = self.send(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!(package_name = %name, "package does not exist on PyPI");
            return Ok(None);
        }
        let response = self.check_status(&url, response)?;

        let payload: LegacyPackageResponse =
            response.json().await.map_err(|source| PypiError::Decode {
                url: url.clone(),
                source,
            })?;

        let versions = payload
            .releases
            .into_iter()
            .map(|(version, files)| {
                let files = files.into_iter().map(LegacyReleaseFile::into_file).collect();
                (version, files)
            })
            .collect();

        Ok(Some(PackageDistributionsResponse { versions }))
    }

    /// Fetch and scan a distribution's metadata sidecar.
    ///
    /// Only attempted for wheels; other package types return `(None, 0)`
    /// without an HTTP call, as does a sidecar 404. The second element is the
    /// sidecar size in bytes.
    pub async fn get_distribution_metadata(
        &self,
        distribution: &Distribution,
    ) -> Result<(Option<CoreMetadata>, i64)> {
        if distribution.package_type != WHEEL_PACKAGE_TYPE {
            tracing::warn!(
                package_type = %distribution.package_type,
                package_filename = %distribution.package_filename,
                "metadata sidecar only exists for wheels"
            );
            return Ok((None, 0));
        }

        let url = format!("{}.metadata", distribution.package_url);
        let response = self.send(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!(
                package_filename = %distribution.package_filename,
                "metadata sidecar not found"
            );
            return Ok((None, 0));
        }
        let response = self.check_status(&url, response)?;

        let declared_size = response
            .content_length()
            .and_then(|length| i64::try_from(length).ok());
        let body = response.text().await.map_err(|source| PypiError::Decode {
            url: url.clone(),
            source,
        })?;
        let size = declared_size.unwrap_or(body.len() as i64);

        Ok((Some(parse_core_metadata(&body)), size))
    }

    /// Open a lazy scan over all package names in the Simple index.
    pub async fn iter_all_package_names(&self) -> Result<SimpleIndexScanner> {
        let url = format!("{}/simple/", self.host);
        let response = self.send(&url).await?;
        let response = self.check_status(&url, response)?;
        Ok(SimpleIndexScanner::new(url, response))
    }

    /// The top-pypi-packages download ranking.
    pub async fn get_popular_packages(&self) -> Result<Vec<PopularPackage>> {
        let url = self.popular_packages_url.clone();
        let response = self.send(&url).await?;
        let response = self.check_status(&url, response)?;

        let payload: PopularPackagesPayload =
            response.json().await.map_err(|source| PypiError::Decode {
                url: url.clone(),
                source,
            })?;

        Ok(payload
            .rows
            .into_iter()
            .map(|row| PopularPackage {
                package_name: row.project,
                download_count: row.download_count,
            })
            .collect())
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(|source| PypiError::Request {
                url: url.to_string(),
                source,
            })
    }

    fn check_status(&self, url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            tracing::error!(%url, %status, "unexpected status from PyPI");
            Err(PypiError::Status {
                url: url.to_string(),
                status,
            })
        }
    }
}

// JSON response types

#[derive(Debug, Deserialize)]
struct LegacyPackageResponse {
    releases: HashMap<String, Vec<LegacyReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct LegacyReleaseFile {
    packagetype: String,
    filename: String,
    url: String,
    python_version: String,
    #[serde(default)]
    requires_python: Option<String>,
    upload_time_iso_8601: DateTime<Utc>,
    #[serde(default)]
    yanked: bool,
}

impl LegacyReleaseFile {
    fn into_file(self) -> DistributionFile {
        DistributionFile {
            package_type: self.packagetype,
            python_version: self.python_version,
            requires_python: self.requires_python,
            upload_time: self.upload_time_iso_8601,
            yanked: self.yanked,
            package_filename: self.filename,
            package_url: self.url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PopularPackagesPayload {
    rows: Vec<PopularRow>,
}

#[derive(Debug, Deserialize)]
struct PopularRow {
    project: String,
    download_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn client_for(server: &mockito::Server) -> PypiClient {
        let url = server.url();
        PypiClient::with_hosts(
            reqwest::Client::new(),
            url.clone(),
            format!("{url}/popular.json"),
        )
    }

    fn wheel_distribution(package_url: String) -> Distribution {
        Distribution {
            distribution_id: Some(Uuid::nil()),
            version_id: Some(Uuid::nil()),
            package_type: "bdist_wheel".into(),
            python_version: "py3".into(),
            requires_python: None,
            upload_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            yanked: false,
            package_filename: "foo-1.0-py3-none-any.whl".into(),
            package_url,
            processed: false,
            metadata_file_size: None,
        }
    }

    #[tokio::test]
    async fn test_legacy_endpoint_canonicalizes_and_parses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/foo/json")
            .with_status(200)
            .with_body(
                r#"{
                    "releases": {
                        "1.0": [{
                            "packagetype": "bdist_wheel",
                            "filename": "foo-1.0-py3-none-any.whl",
                            "url": "https://files.example/foo-1.0-py3-none-any.whl",
                            "python_version": "py3",
                            "requires_python": ">=3.8",
                            "upload_time_iso_8601": "2024-01-01T00:00:00.000000Z",
                            "yanked": false
                        }],
                        "2.0.dev1": []
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client
            .get_package_distributions_legacy("Foo")
            .await
            .unwrap()
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.versions.len(), 2);
        let files = &result.versions["1.0"];
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].package_type, "bdist_wheel");
        assert_eq!(files[0].requires_python.as_deref(), Some(">=3.8"));
        assert!(result.versions["2.0.dev1"].is_empty());
    }

    #[tokio::test]
    async fn test_legacy_endpoint_404_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pypi/missing/json")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client
            .get_package_distributions_legacy("missing")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_legacy_endpoint_5xx_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pypi/flaky/json")
            .with_status(502)
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client.get_package_distributions_legacy("flaky").await;
        assert!(matches!(result, Err(PypiError::Status { .. })));
    }

    #[tokio::test]
    async fn test_metadata_skips_non_wheels_without_a_request() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server);

        let mut distribution = wheel_distribution(format!("{}/foo.tar.gz", server.url()));
        distribution.package_type = "sdist".into();

        let (metadata, size) = client
            .get_distribution_metadata(&distribution)
            .await
            .unwrap();
        assert!(metadata.is_none());
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn test_metadata_fetch_parses_requires_dist() {
        let mut server = mockito::Server::new_async().await;
        let body = "Metadata-Version: 2.1\nName: foo\nRequires-Dist: bar>=1,<2\n\ndescription";
        server
            .mock("GET", "/foo-1.0-py3-none-any.whl.metadata")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(&server);
        let distribution =
            wheel_distribution(format!("{}/foo-1.0-py3-none-any.whl", server.url()));

        let (metadata, size) = client
            .get_distribution_metadata(&distribution)
            .await
            .unwrap();
        assert_eq!(
            metadata.unwrap().requires_dist,
            vec!["bar>=1,<2".to_string()]
        );
        assert_eq!(size, body.len() as i64);
    }

    #[tokio::test]
    async fn test_metadata_404_marks_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/foo-1.0-py3-none-any.whl.metadata")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        let distribution =
            wheel_distribution(format!("{}/foo-1.0-py3-none-any.whl", server.url()));

        let (metadata, size) = client
            .get_distribution_metadata(&distribution)
            .await
            .unwrap();
        assert!(metadata.is_none());
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn test_simple_index_scanner_yields_names_in_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/")
            .with_status(200)
            .with_body(
                "<html><body>\n\
                 <a href=\"/simple/a2wsgi/\">a2wsgi</a>\n\
                 <a href=\"/simple/flask/\">flask</a>\n\
                 not a link line\n\
                 <a href=\"/simple/zope.interface/\">zope.interface</a>\n\
                 </body></html>\n",
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let mut scanner = client.iter_all_package_names().await.unwrap();

        let mut names = Vec::new();
        while let Some(name) = scanner.next_name().await.unwrap() {
            names.push(name);
        }
        assert_eq!(names, vec!["a2wsgi", "flask", "zope.interface"]);
    }

    #[tokio::test]
    async fn test_popular_packages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/popular.json")
            .with_status(200)
            .with_body(
                r#"{"rows": [
                    {"project": "boto3", "download_count": 1000},
                    {"project": "urllib3", "download_count": 900}
                ]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let popular = client.get_popular_packages().await.unwrap();
        assert_eq!(popular.len(), 2);
        assert_eq!(popular[0].package_name, "boto3");
        assert_eq!(popular[0].download_count, 1000);
    }
}
