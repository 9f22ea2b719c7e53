//! Benchmark ranking and summary rendering.

use std::cmp::Ordering;
use std::collections::HashMap;

use policykit_config::SummaryFormat;
use policykit_metrics::{BenchmarkStatistics, MISSING};
use serde::Serialize;
use serde_json::json;

const TITLE: &str = "OPA Benchmark Summary";
const NO_DATA: &str = "No benchmark data.";

/// One ranked benchmark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
  pub rank: usize,
  pub identity: String,
  pub latency_ns: f64,
  /// Share of the summed latency of all ranked entries, in percent.
  pub share_percent: f64,
  pub stats: BenchmarkStatistics,
}

/// Benchmarks ordered fastest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSummary {
  pub ranked: Vec<RankedEntry>,
  /// Entries without latency data, ordered by identity.
  pub unranked: Vec<BenchmarkStatistics>,
  pub total_latency_ns: f64,
}

impl RankedSummary {
  pub fn is_empty(&self) -> bool {
    self.ranked.is_empty() && self.unranked.is_empty()
  }

  /// The fastest entry, when there are at least two to compare.
  pub fn fastest(&self) -> Option<&RankedEntry> {
    (self.ranked.len() > 1).then(|| self.ranked.first()).flatten()
  }

  /// The slowest entry, when there are at least two to compare.
  pub fn slowest(&self) -> Option<&RankedEntry> {
    (self.ranked.len() > 1).then(|| self.ranked.last()).flatten()
  }
}

/// Rank benchmarks by latency, ascending. Ties are broken by identity.
pub fn rank(stats: &HashMap<String, BenchmarkStatistics>) -> RankedSummary {
  let mut timed: Vec<(&String, &BenchmarkStatistics, f64)> = Vec::new();
  let mut unranked: Vec<BenchmarkStatistics> = Vec::new();

  for (identity, entry) in stats {
    match entry.latency_ns() {
      Some(latency) => timed.push((identity, entry, latency)),
      None => unranked.push(entry.clone()),
    }
  }

  timed.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));
  unranked.sort_by(|a, b| a.identity.cmp(&b.identity));

  let total: f64 = timed.iter().map(|(_, _, latency)| latency).sum();
  let ranked = timed
    .into_iter()
    .enumerate()
    .map(|(i, (identity, entry, latency))| RankedEntry {
      rank: i + 1,
      identity: identity.clone(),
      latency_ns: latency,
      share_percent: if total > 0.0 { latency / total * 100.0 } else { 0.0 },
      stats: entry.clone(),
    })
    .collect();

  RankedSummary {
    ranked,
    unranked,
    total_latency_ns: total,
  }
}

/// Render a benchmark summary.
pub fn render_summary(
  stats: &HashMap<String, BenchmarkStatistics>,
  format: SummaryFormat,
) -> String {
  let summary = rank(stats);
  match format {
    SummaryFormat::Text => render_text(&summary),
    SummaryFormat::Markdown => render_markdown(&summary),
    SummaryFormat::Json => {
      serde_json::to_string_pretty(&summary_document(&summary)).unwrap_or_default() + "\n"
    }
  }
}

/// The JSON document behind [`SummaryFormat::Json`].
pub fn summary_document(summary: &RankedSummary) -> serde_json::Value {
  if summary.is_empty() {
    return json!({
      "message": NO_DATA,
      "ranked": [],
      "unranked": [],
    });
  }

  json!({
    "ranked": summary.ranked,
    "unranked": summary.unranked,
    "total_latency_ns": summary.total_latency_ns,
    "fastest": summary.fastest().map(|e| &e.identity),
    "slowest": summary.slowest().map(|e| &e.identity),
  })
}

fn render_text(summary: &RankedSummary) -> String {
  if summary.is_empty() {
    return format!("{}\n", NO_DATA);
  }

  let mut output = String::new();
  output.push_str(TITLE);
  output.push('\n');
  output.push_str(&"=".repeat(60));
  output.push_str("\n\n");

  for entry in &summary.ranked {
    let stats = &entry.stats;
    output.push_str(&format!("  {}. {}\n", entry.rank, entry.identity));
    output.push_str(&format!(
      "      mean: {}  p99: {}  share: {:.1}%\n",
      ns(stats.mean_ns),
      ns(stats.p99_ns),
      entry.share_percent
    ));
    output.push_str(&format!(
      "      ns/op: {} | B/op: {} | allocs/op: {}\n",
      int(stats.ns_per_op),
      int(stats.bytes_per_op),
      int(stats.allocs_per_op)
    ));
    if stats.throughput_ops > 0.0 {
      output.push_str(&format!("      throughput: {:.2} ops/sec\n", stats.throughput_ops));
    }
    if stats.memory_kb != MISSING {
      output.push_str(&format!("      memory: {} KB\n", stats.memory_kb));
    }
    if stats.peak_memory_mb >= 0.0 {
      output.push_str(&format!("      peak memory: {:.2} MB\n", stats.peak_memory_mb));
    }
    output.push('\n');
  }

  if !summary.unranked.is_empty() {
    output.push_str("Unranked (no latency data):\n");
    for stats in &summary.unranked {
      output.push_str(&format!("  - {}\n", stats.identity));
    }
    output.push('\n');
  }

  if let (Some(fastest), Some(slowest)) = (summary.fastest(), summary.slowest()) {
    output.push_str(&format!("Fastest: {} ({})\n", fastest.identity, ns(fastest.latency_ns)));
    output.push_str(&format!("Slowest: {} ({})\n", slowest.identity, ns(slowest.latency_ns)));
  }

  output
}

fn render_markdown(summary: &RankedSummary) -> String {
  if summary.is_empty() {
    return format!("_{}_\n", NO_DATA);
  }

  let mut output = format!("## {}\n\n", TITLE);

  if !summary.ranked.is_empty() {
    output.push_str("| Rank | Query | Mean | p99 | ns/op | B/op | allocs/op | Share |\n");
    output.push_str("|---:|---|---:|---:|---:|---:|---:|---:|\n");
    for entry in &summary.ranked {
      let stats = &entry.stats;
      output.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} | {} | {:.1}% |\n",
        entry.rank,
        code_cell(&entry.identity),
        ns(stats.mean_ns),
        ns(stats.p99_ns),
        int(stats.ns_per_op),
        int(stats.bytes_per_op),
        int(stats.allocs_per_op),
        entry.share_percent
      ));
    }
    output.push('\n');
  }

  if !summary.unranked.is_empty() {
    output.push_str("**Unranked (no latency data):**\n\n");
    for stats in &summary.unranked {
      output.push_str(&format!("- {}\n", code_cell(&stats.identity)));
    }
    output.push('\n');
  }

  if let (Some(fastest), Some(slowest)) = (summary.fastest(), summary.slowest()) {
    output.push_str(&format!(
      "**Fastest:** {} ({})  \n**Slowest:** {} ({})\n",
      code_cell(&fastest.identity),
      ns(fastest.latency_ns),
      code_cell(&slowest.identity),
      ns(slowest.latency_ns)
    ));
  }

  output
}

fn ns(value: f64) -> String {
  if value < 0.0 {
    "n/a".to_string()
  } else {
    format!("{:.2} ns", value)
  }
}

fn int(value: i64) -> String {
  if value == MISSING {
    "n/a".to_string()
  } else {
    value.to_string()
  }
}

pub(crate) fn escape_cell(value: &str) -> String {
  value.replace('|', "\\|").replace('\n', " ")
}

/// Inline code span whose fence outlasts any backtick run in `value`.
pub(crate) fn code_cell(value: &str) -> String {
  let escaped = escape_cell(value);
  let longest = escaped.split(|c| c != '`').map(str::len).max().unwrap_or(0);
  let fence = "`".repeat(longest + 1);
  let pad = if escaped.starts_with('`') || escaped.ends_with('`') {
    " "
  } else {
    ""
  };
  format!("{fence}{pad}{escaped}{pad}{fence}")
}
