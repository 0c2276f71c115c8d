use thiserror::Error;

/// Errors surfaced by the broker adapter.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker operation failed: {0}")]
    Lapin(#[from] lapin::Error),

    #[error("failed to decode message from {queue}: {source}")]
    Decode {
        queue: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode message payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("worker side of the {queue} hand-off is gone")]
    WorkerGone { queue: &'static str },

    #[error("{entity} record is missing its identifier")]
    MissingId { entity: &'static str },

    #[error("failed to spawn consumer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, BrokerError>`.
pub type Result<T> = std::result::Result<T, BrokerError>;
