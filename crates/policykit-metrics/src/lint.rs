use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
  pub file: String,
  pub row: u32,
  pub column: u32,
  pub rule: String,
  pub category: String,
  pub level: String,
  pub description: String,
}

#[derive(Debug, Deserialize)]
struct Report {
  #[serde(default)]
  violations: Vec<RawViolation>,
}

#[derive(Debug, Deserialize)]
struct RawViolation {
  #[serde(default)]
  title: String,
  #[serde(default)]
  description: String,
  #[serde(default)]
  category: String,
  #[serde(default)]
  level: String,
  #[serde(default)]
  location: Location,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
  #[serde(default)]
  file: String,
  #[serde(default)]
  row: u32,
  #[serde(default)]
  col: u32,
}

/// Parse a `regal lint --format json` report.
pub fn parse_lint_report(text: &str) -> Result<Vec<Violation>, ParseError> {
  let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
    return Err(ParseError::unparseable("lint JSON", "no JSON object found"));
  };
  if end < start {
    return Err(ParseError::unparseable("lint JSON", "no JSON object found"));
  }

  let report: Report = serde_json::from_str(&text[start..=end])?;
  Ok(
    report
      .violations
      .into_iter()
      .map(|v| Violation {
        file: v.location.file,
        row: v.location.row,
        column: v.location.col,
        rule: v.title,
        category: v.category,
        level: v.level,
        description: v.description,
      })
      .collect(),
  )
}
