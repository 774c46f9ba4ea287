//! Repository and logging configuration.
//!
//! Every field is optional; unset fields resolve to the defaults below when
//! the configuration is turned into runtime values.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Default bound on transaction attempts for one membership operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
/// Default delay before the second attempt.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 5;
/// Default ceiling for a single backoff delay.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1_000;

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid configuration: {err}"),
            Self::InvalidValue { field, reason } => write!(f, "invalid `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

/// Tuning for the set membership repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Total transaction attempts, including the first one.
    pub max_attempts: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

impl RepositoryConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                reason: "must be at least 1",
            });
        }
        if let (Some(base), Some(max)) = (self.base_backoff_ms, self.max_backoff_ms) {
            if base > max {
                return Err(ConfigError::InvalidValue {
                    field: "base_backoff_ms",
                    reason: "must not exceed max_backoff_ms",
                });
            }
        }
        Ok(())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub fn base_backoff_ms(&self) -> u64 {
        self.base_backoff_ms.unwrap_or(DEFAULT_BASE_BACKOFF_MS)
    }

    pub fn max_backoff_ms(&self) -> u64 {
        self.max_backoff_ms
            .unwrap_or(DEFAULT_MAX_BACKOFF_MS)
            .max(self.base_backoff_ms())
    }
}

/// File logging setup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`. Defaults by build mode.
    #[serde(default)]
    pub level: Option<String>,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
}

impl LoggingConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: None,
            log_dir: log_dir.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RepositoryConfig, DEFAULT_MAX_ATTEMPTS};

    #[test]
    fn empty_document_uses_defaults() {
        let config = RepositoryConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert_eq!(config.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert!(config.base_backoff_ms() <= config.max_backoff_ms());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = RepositoryConfig::from_json_str(
            r#"{"max_attempts": 3, "base_backoff_ms": 2, "max_backoff_ms": 8}"#,
        )
        .unwrap();
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.base_backoff_ms(), 2);
        assert_eq!(config.max_backoff_ms(), 8);
    }

    #[test]
    fn zero_attempts_and_unknown_fields_are_rejected() {
        let err = RepositoryConfig::from_json_str(r#"{"max_attempts": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "max_attempts",
                ..
            }
        ));

        let err = RepositoryConfig::from_json_str(r#"{"retries": 4}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let err =
            RepositoryConfig::from_json_str(r#"{"base_backoff_ms": 50, "max_backoff_ms": 10}"#)
                .unwrap_err();
        assert!(err.to_string().contains("base_backoff_ms"));
    }
}
