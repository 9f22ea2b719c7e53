//! Concurrency and timeout limits for a dispatch batch.

use std::time::Duration;

use crate::error::ConfigError;

/// Concurrency cap used when neither the CLI nor the config file sets one.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Per-item timeout used when neither the CLI nor the config file sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest accepted per-item timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Limits applied to one dispatch batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
  /// Maximum number of units running at once. Must be > 0.
  pub max_workers: usize,
  /// Deadline for each unit, measured from the moment it starts running.
  pub timeout: Duration,
}

impl DispatchConfig {
  /// Build a validated config.
  pub fn new(max_workers: usize, timeout: Duration) -> Result<Self, ConfigError> {
    let config = Self {
      max_workers,
      timeout,
    };
    config.validate()?;
    Ok(config)
  }

  /// Reject a zero worker count, a zero timeout, or a timeout above
  /// [`MAX_TIMEOUT`].
  ///
  /// There is no lenient fallback: a zero cap is always an error.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_workers == 0 {
      return Err(ConfigError::InvalidWorkers {
        value: self.max_workers,
      });
    }
    if self.timeout.is_zero() {
      return Err(ConfigError::InvalidTimeout);
    }
    if self.timeout > MAX_TIMEOUT {
      return Err(ConfigError::TimeoutTooLong {
        value: self.timeout,
        max: MAX_TIMEOUT,
      });
    }
    Ok(())
  }
}

/// Parse a human duration: `15s`, `500ms`, `2m`, `1h`, or bare seconds (`30`, `1.5`).
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(ConfigError::invalid_duration(value, "empty duration"));
  }

  let split = trimmed
    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
    .unwrap_or(trimmed.len());
  let (number, unit) = trimmed.split_at(split);

  let amount: f64 = number
    .parse()
    .map_err(|_| ConfigError::invalid_duration(value, "expected a number"))?;

  let seconds = match unit.trim() {
    "" | "s" | "sec" | "secs" => amount,
    "ms" => amount / 1_000.0,
    "m" | "min" | "mins" => amount * 60.0,
    "h" => amount * 3_600.0,
    other => {
      return Err(ConfigError::invalid_duration(
        value,
        format!("unknown unit '{}'", other),
      ));
    }
  };

  if !seconds.is_finite() || seconds < 0.0 {
    return Err(ConfigError::invalid_duration(value, "out of range"));
  }

  Duration::try_from_secs_f64(seconds)
    .map_err(|_| ConfigError::invalid_duration(value, "out of range"))
}
