use thiserror::Error;

/// Errors raised while assembling configuration from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: String, value: String },

    #[error("failed to read {path} for {var}: {source}")]
    SecretFile {
        var: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the configuration module.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let error = ConfigError::InvalidValue {
            var: "POSTGRES_PORT".into(),
            value: "fifty".into(),
        };
        assert_eq!(error.to_string(), "invalid value \"fifty\" for POSTGRES_PORT");
    }
}
