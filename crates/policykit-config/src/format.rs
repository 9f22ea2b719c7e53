//! Output format selectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Format of a batch report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  /// Plain text for terminals.
  #[default]
  Text,
  /// Machine-readable JSON.
  Json,
  /// Markdown tables (PR comments, job summaries).
  Markdown,
  /// GitHub Actions workflow commands (`::error file=...::`).
  Github,
}

impl OutputFormat {
  const EXPECTED: &'static str = "text, json, markdown, github";

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Text => "text",
      Self::Json => "json",
      Self::Markdown => "markdown",
      Self::Github => "github",
    }
  }
}

impl fmt::Display for OutputFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OutputFormat {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "text" | "plain" => Ok(Self::Text),
      "json" => Ok(Self::Json),
      "markdown" | "md" => Ok(Self::Markdown),
      "github" | "gh" => Ok(Self::Github),
      _ => Err(ConfigError::UnknownFormat {
        value: s.to_string(),
        expected: Self::EXPECTED,
      }),
    }
  }
}

/// Format of the benchmark summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
  #[default]
  Text,
  Markdown,
  Json,
}

impl SummaryFormat {
  const EXPECTED: &'static str = "text, markdown, json";
}

impl FromStr for SummaryFormat {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "text" | "plain" => Ok(Self::Text),
      "markdown" | "md" => Ok(Self::Markdown),
      "json" => Ok(Self::Json),
      _ => Err(ConfigError::UnknownFormat {
        value: s.to_string(),
        expected: Self::EXPECTED,
      }),
    }
  }
}

impl From<OutputFormat> for SummaryFormat {
  fn from(format: OutputFormat) -> Self {
    match format {
      OutputFormat::Json => Self::Json,
      OutputFormat::Markdown => Self::Markdown,
      OutputFormat::Text | OutputFormat::Github => Self::Text,
    }
  }
}
