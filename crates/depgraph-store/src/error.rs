use thiserror::Error;

/// Errors surfaced by the repositories.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("{entity} record is missing its identifier")]
    MissingId { entity: &'static str },

    #[error("unknown CDC operation {value:?}")]
    UnknownCdcOperation { value: String },
}

/// Convenience type alias for `Result<T, StoreError>`.
pub type Result<T> = std::result::Result<T, StoreError>;
