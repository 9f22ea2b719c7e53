//! Configuration errors.

use std::path::PathBuf;

/// Errors raised while building configuration.
///
/// These are the only errors that prevent a batch from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// Concurrency cap of zero.
  #[error("max workers must be greater than zero (got {value})")]
  InvalidWorkers { value: usize },

  /// Per-item timeout of zero.
  #[error("per-item timeout must be greater than zero")]
  InvalidTimeout,

  /// Per-item timeout above the supported maximum.
  #[error("per-item timeout {value:?} exceeds the maximum of {max:?}")]
  TimeoutTooLong {
    value: std::time::Duration,
    max: std::time::Duration,
  },

  /// A duration string could not be parsed.
  #[error("invalid duration '{value}': {message}")]
  InvalidDuration { value: String, message: String },

  /// An output format name was not recognized.
  #[error("unknown output format '{value}' (expected one of: {expected})")]
  UnknownFormat { value: String, expected: &'static str },

  /// The config file could not be read.
  #[error("failed to read config file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The config file is not valid JSON for [`crate::FileConfig`].
  #[error("failed to parse config file {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl ConfigError {
  pub fn invalid_duration(value: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidDuration {
      value: value.into(),
      message: message.into(),
    }
  }
}
