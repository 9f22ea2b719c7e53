//! Batch reports for any operation.

use policykit_config::OutputFormat;
use policykit_dispatch::{ExecutionOutcome, UnitState};
use policykit_metrics::{BenchmarkStatistics, CoverageSummary, MISSING, Violation};
use policykit_toolkit::{FormatChange, Operation};
use serde::Serialize;

use crate::summary::{code_cell, escape_cell};

/// Lines of failed tool output kept in text reports.
const OUTPUT_TAIL: usize = 20;

/// A CI annotation attached to a source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
  pub file: Option<String>,
  pub line: Option<u32>,
  pub column: Option<u32>,
  pub title: String,
  pub message: String,
}

/// Turns an outcome's details into report lines.
pub trait Describe {
  fn lines(&self) -> Vec<String>;

  fn annotations(&self, _identity: &str) -> Vec<Annotation> {
    Vec::new()
  }
}

impl Describe for Vec<Violation> {
  fn lines(&self) -> Vec<String> {
    self
      .iter()
      .map(|v| {
        format!(
          "{}:{}:{} {}: {} ({}/{})",
          v.file, v.row, v.column, v.rule, v.description, v.category, v.level
        )
      })
      .collect()
  }

  fn annotations(&self, identity: &str) -> Vec<Annotation> {
    self
      .iter()
      .map(|v| Annotation {
        file: Some(if v.file.is_empty() { identity.to_string() } else { v.file.clone() }),
        line: Some(v.row),
        column: Some(v.column),
        title: v.rule.clone(),
        message: v.description.clone(),
      })
      .collect()
  }
}

impl Describe for FormatChange {
  fn lines(&self) -> Vec<String> {
    let line = match (self.changed, self.written) {
      (false, _) => "already formatted",
      (true, true) => "reformatted",
      (true, false) => "would reformat",
    };
    vec![line.to_string()]
  }

  fn annotations(&self, identity: &str) -> Vec<Annotation> {
    if self.changed && !self.written {
      vec![Annotation {
        file: Some(identity.to_string()),
        line: None,
        column: None,
        title: "unformatted".to_string(),
        message: "file is not formatted; run `policykit fmt --write`".to_string(),
      }]
    } else {
      Vec::new()
    }
  }
}

impl Describe for CoverageSummary {
  fn lines(&self) -> Vec<String> {
    vec![format!(
      "coverage: {:.1}% ({}/{} lines, {}/{} regions, {} files)",
      self.percent,
      self.covered_lines,
      self.total_lines,
      self.covered_regions,
      self.total_regions,
      self.file_count
    )]
  }
}

impl Describe for BenchmarkStatistics {
  fn lines(&self) -> Vec<String> {
    let latency = self
      .latency_ns()
      .map_or_else(|| "n/a".to_string(), |ns| format!("{:.2} ns", ns));
    let iterations = if self.iterations == MISSING {
      "n/a".to_string()
    } else {
      self.iterations.to_string()
    };
    vec![format!("latency: {}  iterations: {}", latency, iterations)]
  }
}

/// One row per attempted work item.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
  pub identity: String,
  pub success: bool,
  pub state: UnitState,
  pub elapsed_ms: u64,
  pub error: Option<String>,
  pub parse_error: Option<String>,
  pub details: Vec<String>,
  pub annotations: Vec<Annotation>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub output: String,
}

/// Report of one operation, ready to render.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
  pub operation: String,
  pub batch_id: String,
  pub total: usize,
  pub failures: usize,
  pub first_error: Option<String>,
  pub discovery_errors: Vec<String>,
  pub rows: Vec<BatchRow>,
}

impl BatchReport {
  pub fn from_operation<D: Describe>(operation: &str, result: &Operation<D>) -> Self {
    let aggregate = &result.aggregate;
    let rows = aggregate.sorted().into_iter().map(row).collect();

    Self {
      operation: operation.to_string(),
      batch_id: aggregate.batch_id.clone(),
      total: aggregate.len(),
      failures: aggregate.failure_count,
      first_error: aggregate.error().map(|e| e.to_string()),
      discovery_errors: result.discovery_errors.iter().map(ToString::to_string).collect(),
      rows,
    }
  }

  pub fn succeeded(&self) -> bool {
    self.failures == 0 && self.discovery_errors.is_empty()
  }
}

fn row<D: Describe>(outcome: &ExecutionOutcome<D>) -> BatchRow {
  let (details, annotations) = match &outcome.details {
    Some(details) => (details.lines(), details.annotations(&outcome.identity)),
    None => (Vec::new(), Vec::new()),
  };

  BatchRow {
    identity: outcome.identity.clone(),
    success: outcome.success,
    state: outcome.state(),
    elapsed_ms: outcome.elapsed.as_millis() as u64,
    error: outcome.error.as_ref().map(ToString::to_string),
    parse_error: outcome.parse_error.clone(),
    details,
    annotations,
    output: outcome.output.clone(),
  }
}

/// Render a batch report.
pub fn render_batch(report: &BatchReport, format: OutputFormat) -> String {
  match format {
    OutputFormat::Text => render_text(report),
    OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default() + "\n",
    OutputFormat::Markdown => render_markdown(report),
    OutputFormat::Github => render_github(report),
  }
}

fn icon(state: UnitState) -> &'static str {
  match state {
    UnitState::Succeeded => "✓",
    UnitState::Failed => "✗",
    UnitState::TimedOut => "⏱",
  }
}

fn status_line(report: &BatchReport) -> String {
  if report.succeeded() {
    format!("OK: {} {} unit(s) succeeded", report.total, report.operation)
  } else if let Some(first) = &report.first_error {
    format!("FAILED: {}", first)
  } else {
    format!(
      "FAILED: {} root(s) could not be searched",
      report.discovery_errors.len()
    )
  }
}

fn render_text(report: &BatchReport) -> String {
  let mut output = String::new();
  output.push_str(&format!(
    "{}: {} unit(s), {} failed\n",
    report.operation, report.total, report.failures
  ));
  output.push_str(&"=".repeat(60));
  output.push('\n');

  for row in &report.rows {
    output.push_str(&format!("  {} {} ({} ms)", icon(row.state), row.identity, row.elapsed_ms));
    if let Some(error) = &row.error {
      output.push_str(&format!("  {}", error));
    }
    output.push('\n');

    for line in &row.details {
      output.push_str(&format!("      {}\n", line));
    }
    if let Some(parse_error) = &row.parse_error {
      output.push_str(&format!("      parse error: {}\n", parse_error));
    }
    if !row.success && row.details.is_empty() && !row.output.trim().is_empty() {
      let lines: Vec<&str> = row.output.lines().collect();
      let skip = lines.len().saturating_sub(OUTPUT_TAIL);
      if skip > 0 {
        output.push_str(&format!("      ... {} line(s) omitted\n", skip));
      }
      for line in &lines[skip..] {
        output.push_str(&format!("      | {}\n", line));
      }
    }
  }

  if !report.discovery_errors.is_empty() {
    output.push_str("\nDiscovery errors:\n");
    for error in &report.discovery_errors {
      output.push_str(&format!("  ! {}\n", error));
    }
  }

  output.push('\n');
  output.push_str(&status_line(report));
  output.push('\n');
  output
}

fn render_markdown(report: &BatchReport) -> String {
  let mut output = format!("## policykit {}\n\n", report.operation);

  if report.rows.is_empty() {
    output.push_str("_No work items._\n\n");
  } else {
    output.push_str("| Status | Item | Time | Result |\n");
    output.push_str("|:---:|---|---:|---|\n");
    for row in &report.rows {
      let mut result: Vec<String> = row.error.iter().cloned().collect();
      result.extend(row.details.iter().cloned());
      output.push_str(&format!(
        "| {} | {} | {} ms | {} |\n",
        icon(row.state),
        code_cell(&row.identity),
        row.elapsed_ms,
        escape_cell(&result.join("<br>"))
      ));
    }
    output.push('\n');
  }

  for error in &report.discovery_errors {
    output.push_str(&format!("> ⚠ {}\n", escape_cell(error)));
  }
  if !report.discovery_errors.is_empty() {
    output.push('\n');
  }

  output.push_str(&format!("**{}**\n", status_line(report)));
  output
}

/// GitHub Actions workflow commands for failures, followed by the text report.
fn render_github(report: &BatchReport) -> String {
  let mut output = String::new();

  for row in report.rows.iter().filter(|r| !r.success) {
    if row.annotations.is_empty() {
      let message = row.error.clone().unwrap_or_else(|| "failed".to_string());
      output.push_str(&format!(
        "::error title={}::{}\n",
        escape_property(&row.identity),
        escape_data(&message)
      ));
      continue;
    }

    for annotation in &row.annotations {
      let mut properties = Vec::new();
      if let Some(file) = &annotation.file {
        properties.push(format!("file={}", escape_property(file)));
      }
      if let Some(line) = annotation.line {
        properties.push(format!("line={}", line));
      }
      if let Some(column) = annotation.column {
        properties.push(format!("col={}", column));
      }
      properties.push(format!("title={}", escape_property(&annotation.title)));

      output.push_str(&format!(
        "::error {}::{}\n",
        properties.join(","),
        escape_data(&annotation.message)
      ));
    }
  }

  for error in &report.discovery_errors {
    output.push_str(&format!("::error title=discovery::{}\n", escape_data(error)));
  }

  output.push_str(&render_text(report));
  output
}

fn escape_data(value: &str) -> String {
  value
    .replace('%', "%25")
    .replace('\r', "%0D")
    .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
  escape_data(value).replace(':', "%3A").replace(',', "%2C")
}
