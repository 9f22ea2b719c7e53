use thiserror::Error;

/// Tool output could not be turned into structured data.
#[derive(Debug, Error)]
pub enum ParseError {
  /// The text does not have the expected shape at all.
  #[error("unparseable {expected} output: {reason}")]
  Unparseable {
    expected: &'static str,
    reason: String,
  },

  #[error("invalid JSON: {0}")]
  Json(#[from] serde_json::Error),
}

impl ParseError {
  pub fn unparseable(expected: &'static str, reason: impl Into<String>) -> Self {
    Self::Unparseable {
      expected,
      reason: reason.into(),
    }
  }
}
