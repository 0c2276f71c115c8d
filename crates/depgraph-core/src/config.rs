//! Environment-variable configuration for the worker processes.
//!
//! Every knob has a default so a worker comes up against a local Postgres and
//! RabbitMQ with no environment at all. Values are read once at process start
//! in the entry point and passed down as explicit collaborators.

use std::env;

use crate::error::{ConfigError, Result};

/// Connection settings for the relational store.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub db: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: u32,
}

impl PostgresConfig {
    /// Reads `POSTGRES_*` variables. `POSTGRES_PASSWORD_FILE`, when set,
    /// overrides `POSTGRES_PASSWORD` with the file's trimmed contents.
    pub fn from_env() -> Result<Self> {
        let mut password = env_or("POSTGRES_PASSWORD", "password");
        if let Some(path) = env::var("POSTGRES_PASSWORD_FILE").ok().filter(|p| !p.is_empty()) {
            password = std::fs::read_to_string(&path)
                .map(|contents| contents.trim().to_string())
                .map_err(|source| ConfigError::SecretFile {
                    var: "POSTGRES_PASSWORD_FILE".into(),
                    path,
                    source,
                })?;
        }

        Ok(Self {
            host: env_or("POSTGRES_HOST", "localhost"),
            port: env_parse("POSTGRES_PORT", 5432)?,
            db: env_or("POSTGRES_DB", "defaultdb"),
            username: env_or("POSTGRES_USERNAME", "pypi_scraper"),
            password,
            max_pool_size: 10,
        })
    }
}

/// Connection and topology settings for the message broker.
#[derive(Debug, Clone)]
pub struct RabbitConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
    /// When set, consumers identify themselves as `<prefix><uuid>`.
    pub ctag_prefix: Option<String>,

    pub names_prefetch: u16,
    pub dists_prefetch: u16,
    pub reprocess_requirements_prefetch: u16,
    pub candidate_correlation_prefetch: u16,
    pub cdc_versions_prefetch: u16,
    pub cdc_requirements_prefetch: u16,
}

impl RabbitConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_or("RABBITMQ_HOST", "localhost"),
            port: env_parse("RABBITMQ_PORT", 5672)?,
            username: env_or("RABBITMQ_USERNAME", "pypi_scraper"),
            password: env_or("RABBITMQ_PASSWORD", "password"),
            vhost: env_or("RABBITMQ_VHOST", "pypi_scraper"),
            exchange: env_or("RABBITMQ_EXCHANGE", "pypi_scraper"),
            ctag_prefix: env::var("RABBITMQ_CTAG_PREFIX").ok().filter(|p| !p.is_empty()),
            names_prefetch: env_parse("RABBITMQ_NAMES_SUB_PREFETCH", 50)?,
            dists_prefetch: env_parse("RABBITMQ_DISTS_SUB_PREFETCH", 100)?,
            reprocess_requirements_prefetch: env_parse("RABBITMQ_REPROCESS_REQS_SUB_PREFETCH", 100)?,
            candidate_correlation_prefetch: env_parse("RABBITMQ_REQS_CAND_CORR_SUB_PREFETCH", 100)?,
            cdc_versions_prefetch: env_parse("RABBITMQ_CDC_VERSIONS_SUB_PREFETCH", 100)?,
            cdc_requirements_prefetch: env_parse("RABBITMQ_CDC_REQS_SUB_PREFETCH", 100)?,
        })
    }
}

/// Behavior toggles for the distribution processor.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Insert dependency names discovered in requirements back into the
    /// crawl front, publishing the newly inserted subset.
    pub discover_package_names: bool,
    /// Reprocess distributions even when their `processed` flag is set.
    pub ignore_processed_flag: bool,
}

impl ProcessorConfig {
    pub fn from_env() -> Self {
        Self {
            discover_package_names: env_flag("DIST_PROCESSOR_DISCOVER_PACKAGE_NAMES", false),
            ignore_processed_flag: env_flag("DIST_PROCESSOR_IGNORE_PROCESSED_FLAG", false),
        }
    }
}

/// Which record kinds the unprocessed-record loader pushes to the broker.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub load_package_names: bool,
    pub load_distributions: bool,
    pub only_load_bdist_wheel_distributions: bool,
    pub only_load_unprocessed_distributions: bool,
    pub load_incomplete_requirements: bool,
    pub load_requirements_for_candidate_correlation: bool,
    /// Ask the insert for the newly inserted subset and publish it first.
    pub count_inserted: bool,
    /// Name-prefix filter applied by the simple-index loader.
    pub package_name_prefix_regex: String,
}

impl LoaderConfig {
    pub fn from_env() -> Self {
        Self {
            load_package_names: env_flag("UPL_LOAD_PACKAGE_NAMES", true),
            load_distributions: env_flag("UPL_LOAD_DISTRIBUTIONS", true),
            only_load_bdist_wheel_distributions: env_flag(
                "UPL_ONLY_LOAD_BDIST_WHEEL_DISTRIBUTIONS",
                false,
            ),
            only_load_unprocessed_distributions: env_flag(
                "UPL_ONLY_LOAD_UNPROCESSED_DISTRIBUTIONS",
                true,
            ),
            load_incomplete_requirements: env_flag("UPL_LOAD_INCOMPLETE_REQUIREMENTS", true),
            load_requirements_for_candidate_correlation: env_flag(
                "UPL_LOAD_REQUIREMENTS_FOR_CANDIDATE_CORRELATION",
                false,
            ),
            count_inserted: env_flag("PACKAGE_NAME_LOADER_COUNT_INSERTED", true),
            package_name_prefix_regex: env_or("PACKAGE_NAME_PREFIX_REGEX", "^"),
        }
    }
}

/// Hashmod sharding of reprocessing sweeps across parallel workers.
///
/// `DIST_ID_HASH_MOD_FILTER` is 1-based in the environment for operator
/// friendliness and decremented here to the 0-based residue used in SQL.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub hash_alg: String,
    pub mod_base: i32,
    pub mod_filter: i32,
}

impl ShardConfig {
    pub fn from_env() -> Result<Self> {
        let filter_1_based: i32 = env_parse("DIST_ID_HASH_MOD_FILTER", 1)?;
        Ok(Self {
            hash_alg: env_or("DIST_ID_HASH_ALG", "md5"),
            mod_base: env_parse("DIST_ID_HASH_MOD_BASE", 16)?,
            mod_filter: filter_1_based - 1,
        })
    }
}

/// Batch sizes for streaming iteration and periodic commits.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub iter_batch_size: i64,
    pub cdc_iter_batch_size: i64,
    pub commit_batch_size: usize,
}

impl BatchConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            iter_batch_size: env_parse("REPO_ITER_BATCH_SIZE", 50_000)?,
            cdc_iter_batch_size: env_parse("CDC_EVENT_LOG_REPO_ITER_BATCH_SIZE", 1_000)?,
            commit_batch_size: env_parse("COMMIT_BATCH_SIZE", 1_000)?,
        })
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            iter_batch_size: 50_000,
            cdc_iter_batch_size: 1_000,
            commit_batch_size: 1_000,
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_value(var, value.trim(), default),
        _ => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(var: &str, value: &str, _default: T) -> Result<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn env_flag(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(value) => flag_value(&value, default),
        Err(_) => default,
    }
}

fn flag_value(value: &str, default: bool) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return default;
    }
    trimmed.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_value_true_forms() {
        assert!(flag_value("true", false));
        assert!(flag_value(" TRUE ", false));
        assert!(flag_value("True", false));
    }

    #[test]
    fn test_flag_value_everything_else_is_false() {
        assert!(!flag_value("1", true));
        assert!(!flag_value("yes", true));
        assert!(!flag_value("false", true));
    }

    #[test]
    fn test_flag_value_blank_keeps_default() {
        assert!(flag_value("   ", true));
        assert!(!flag_value("", false));
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let result: Result<u16> = parse_value("POSTGRES_PORT", "fifty", 5432);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_value_accepts_number() {
        let result: Result<u16> = parse_value("POSTGRES_PORT", "5433", 5432);
        assert_eq!(result.unwrap(), 5433);
    }
}
