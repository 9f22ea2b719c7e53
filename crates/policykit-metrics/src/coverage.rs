use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Totals over every file in a coverage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSummary {
  pub file_count: usize,
  pub total_regions: usize,
  pub covered_regions: usize,
  pub total_lines: usize,
  pub covered_lines: usize,
  /// Overall percentage as reported by the tool.
  pub percent: f64,
}

#[derive(Debug, Deserialize)]
struct Report {
  #[serde(default)]
  coverage: f64,
  #[serde(default)]
  files: BTreeMap<String, FileReport>,
}

#[derive(Debug, Default, Deserialize)]
struct FileReport {
  #[serde(default)]
  covered: Vec<Region>,
  #[serde(default)]
  not_covered: Vec<Region>,
}

#[derive(Debug, Deserialize)]
struct Region {
  start: Position,
  end: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
  row: usize,
}

impl Region {
  fn lines(&self) -> usize {
    self.end.row.saturating_sub(self.start.row) + 1
  }
}

/// Summarize the JSON report of `opa test --coverage`.
pub fn summarize_coverage(text: &str) -> Result<CoverageSummary, ParseError> {
  let trimmed = text.trim();
  if !trimmed.starts_with('{') {
    return Err(ParseError::unparseable(
      "coverage JSON",
      "expected a JSON object",
    ));
  }

  let report: Report = serde_json::from_str(trimmed)?;

  let mut summary = CoverageSummary {
    file_count: report.files.len(),
    total_regions: 0,
    covered_regions: 0,
    total_lines: 0,
    covered_lines: 0,
    percent: report.coverage,
  };

  for file in report.files.values() {
    let covered_lines: usize = file.covered.iter().map(Region::lines).sum();
    let uncovered_lines: usize = file.not_covered.iter().map(Region::lines).sum();

    summary.covered_regions += file.covered.len();
    summary.total_regions += file.covered.len() + file.not_covered.len();
    summary.covered_lines += covered_lines;
    summary.total_lines += covered_lines + uncovered_lines;
  }

  Ok(summary)
}
