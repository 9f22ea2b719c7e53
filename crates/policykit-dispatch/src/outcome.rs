//! Per-item execution outcomes.

use std::time::Duration;

use serde::{Serialize, Serializer};

/// Why a unit failed.
///
/// Cloneable so that outcomes can be handed to completion callbacks
/// while the original sits in the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
  /// The external tool could not be started.
  #[error("failed to launch '{program}': {message}")]
  Launch { program: String, message: String },

  /// The tool exited with a non-zero status.
  #[error("exited with status {code}")]
  NonZeroExit { code: i32 },

  /// The tool was killed by a signal it did not expect.
  #[error("terminated by signal")]
  Terminated,

  /// The unit's deadline passed or the batch was cancelled.
  #[error("deadline exceeded")]
  DeadlineExceeded,

  /// Local I/O failed (reading a source file, writing it back).
  #[error("i/o error: {message}")]
  Io { message: String },

  /// The worker task panicked.
  #[error("worker panicked: {message}")]
  Panicked { message: String },

  /// The tool ran but reported a failure of its own (violations, unformatted file).
  #[error("{message}")]
  Failed { message: String },
}

impl ExecutionError {
  pub fn io(message: impl Into<String>) -> Self {
    Self::Io {
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  /// Timeouts and cancellations are the same thing to callers.
  pub fn is_deadline(&self) -> bool {
    matches!(self, Self::DeadlineExceeded)
  }
}

/// Terminal state of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
  Succeeded,
  Failed,
  TimedOut,
}

/// The captured result of running one work item.
///
/// Created once by the executor and never mutated afterwards. `output` is
/// always populated with whatever the tool printed, including when
/// `success` is false.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome<D> {
  pub identity: String,
  /// Combined stdout and stderr.
  pub output: String,
  #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
  pub elapsed: Duration,
  pub success: bool,
  pub error: Option<ExecutionError>,
  /// Data derived from the output (violations, coverage, statistics).
  pub details: Option<D>,
  /// Set when the output could not be parsed into `details`.
  pub parse_error: Option<String>,
}

impl<D> ExecutionOutcome<D> {
  /// Build an outcome from the tool's status.
  pub fn new(
    identity: impl Into<String>,
    output: impl Into<String>,
    elapsed: Duration,
    status: Result<(), ExecutionError>,
  ) -> Self {
    let error = status.err();
    Self {
      identity: identity.into(),
      output: output.into(),
      elapsed,
      success: error.is_none(),
      error,
      details: None,
      parse_error: None,
    }
  }

  /// Outcome for a unit that never launched because the batch was cancelled.
  pub fn cancelled(identity: impl Into<String>) -> Self {
    Self::new(
      identity,
      String::new(),
      Duration::ZERO,
      Err(ExecutionError::DeadlineExceeded),
    )
  }

  /// Outcome for a worker that panicked.
  pub fn panicked(identity: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(
      identity,
      String::new(),
      Duration::ZERO,
      Err(ExecutionError::Panicked {
        message: message.into(),
      }),
    )
  }

  pub fn with_details(mut self, details: D) -> Self {
    self.details = Some(details);
    self
  }

  pub fn with_parse_error(mut self, message: impl Into<String>) -> Self {
    self.parse_error = Some(message.into());
    self
  }

  /// Mark the outcome failed, replacing any earlier error.
  pub fn with_error(mut self, error: ExecutionError) -> Self {
    self.success = false;
    self.error = Some(error);
    self
  }

  pub fn state(&self) -> UnitState {
    match &self.error {
      None => UnitState::Succeeded,
      Some(e) if e.is_deadline() => UnitState::TimedOut,
      Some(_) => UnitState::Failed,
    }
  }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_failed_outcome_keeps_output() {
    let outcome: ExecutionOutcome<()> = ExecutionOutcome::new(
      "policies",
      "FAIL: data.test.test_allow",
      Duration::from_millis(12),
      Err(ExecutionError::NonZeroExit { code: 2 }),
    );

    assert!(!outcome.success);
    assert_eq!(outcome.output, "FAIL: data.test.test_allow");
    assert_eq!(outcome.state(), UnitState::Failed);
  }

  #[test]
  fn test_state_classification() {
    let ok: ExecutionOutcome<()> = ExecutionOutcome::new("a", "", Duration::ZERO, Ok(()));
    assert_eq!(ok.state(), UnitState::Succeeded);
    assert!(ok.success);

    let cancelled: ExecutionOutcome<()> = ExecutionOutcome::cancelled("b");
    assert_eq!(cancelled.state(), UnitState::TimedOut);
    assert!(!cancelled.success);
  }

  #[test]
  fn test_with_error_marks_failure() {
    let outcome: ExecutionOutcome<u32> = ExecutionOutcome::new("a", "", Duration::ZERO, Ok(()))
      .with_details(3)
      .with_error(ExecutionError::failed("3 violations"));

    assert!(!outcome.success);
    assert_eq!(outcome.details, Some(3));
    assert_eq!(outcome.error.unwrap().to_string(), "3 violations");
  }

  #[test]
  fn test_serialize_outcome() {
    let outcome: ExecutionOutcome<()> = ExecutionOutcome::new(
      "q",
      "out",
      Duration::from_millis(1500),
      Err(ExecutionError::DeadlineExceeded),
    );
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["elapsed_ms"], 1500);
    assert_eq!(json["error"]["kind"], "deadline_exceeded");
    assert_eq!(json["success"], false);
  }
}
