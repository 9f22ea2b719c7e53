use std::path::PathBuf;

use policykit_dispatch::ExecutionError;
use serde::Serialize;
use thiserror::Error;

/// Traversal of one discovery root failed.
///
/// Other roots are unaffected.
#[derive(Debug, Clone, Error, Serialize)]
#[error("cannot walk {}: {message}", root.display())]
pub struct DiscoveryError {
  pub root: PathBuf,
  pub message: String,
}

impl DiscoveryError {
  pub fn new(root: impl Into<PathBuf>, message: impl Into<String>) -> Self {
    Self {
      root: root.into(),
      message: message.into(),
    }
  }
}

/// A formatter rejected its input.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct FormatFailure {
  pub error: ExecutionError,
  /// Whatever the formatter printed (parse errors, usage).
  pub diagnostics: String,
}

impl FormatFailure {
  pub fn new(error: ExecutionError, diagnostics: impl Into<String>) -> Self {
    Self {
      error,
      diagnostics: diagnostics.into(),
    }
  }
}
