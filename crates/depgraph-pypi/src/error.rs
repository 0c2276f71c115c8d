use thiserror::Error;

/// Errors surfaced by the PyPI client.
///
/// A plain 404 is not an error: the affected methods return `None` so callers
/// can mark the work done and move on.
#[derive(Error, Debug)]
pub enum PypiError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Convenience type alias for `Result<T, PypiError>`.
pub type Result<T> = std::result::Result<T, PypiError>;
