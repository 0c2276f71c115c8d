use thiserror::Error;

/// Errors raised while processing pipeline messages.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] depgraph_store::StoreError),

    #[error(transparent)]
    Pypi(#[from] depgraph_pypi::PypiError),

    #[error(transparent)]
    Broker(#[from] depgraph_broker::BrokerError),

    #[error(transparent)]
    Config(#[from] depgraph_core::ConfigError),

    #[error("database transaction failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AMQP operation failed: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error storing/retrieving package named {package_name:?} to/from database")]
    PackageNameRoundTrip { package_name: String },

    #[error("no version row for {package_name} {package_version} after upsert")]
    MissingVersionId {
        package_name: String,
        package_version: String,
    },

    #[error("{entity} record is missing its identifier")]
    MissingId { entity: &'static str },

    #[error("invalid package-name prefix regex {pattern:?}: {source}")]
    InvalidPrefixRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Convenience type alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;
