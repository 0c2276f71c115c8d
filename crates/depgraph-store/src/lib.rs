//! Postgres repositories for the pipeline tables.
//!
//! One repository per logical table, each owning its table's SQL. Every write
//! method comes in two entry points: a pooled one that opens and commits its
//! own transaction, and a `*_conn` one taking `&mut PgConnection` so a caller
//! can compose several writes into one transaction. Multi-row statements are
//! chunked against the 65,535-parameter statement ceiling, and large scans
//! are keyset-paginated streams.

pub mod batch;
pub mod candidates;
pub mod cdc;
pub mod distributions;
pub mod error;
pub mod package_names;
pub mod requirements;
pub mod tables;
pub mod versions;

pub use candidates::CandidateRepository;
pub use cdc::CdcRepository;
pub use distributions::{DistributionFilter, DistributionRepository};
pub use error::{Result, StoreError};
pub use package_names::PackageNameRepository;
pub use requirements::{HashModFilter, RequirementFilter, RequirementRepository};
pub use versions::VersionRepository;

use depgraph_core::config::PostgresConfig;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

/// Open the process-wide connection pool.
pub async fn connect(config: &PostgresConfig) -> Result<PgPool> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.db)
        .username(&config.username)
        .password(&config.password);

    PgPoolOptions::new()
        .max_connections(config.max_pool_size)
        .connect_with(options)
        .await
        .map_err(Into::into)
}
