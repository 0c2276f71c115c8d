//! Shared construction helpers for the entry points.

use crate::error::Result;

/// Identifies the crawler to PyPI; a static user agent so operators can be
/// reached if the crawl misbehaves.
const USER_AGENT: &str = concat!("depgraph/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by everything a process fetches from PyPI.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(Into::into)
}
