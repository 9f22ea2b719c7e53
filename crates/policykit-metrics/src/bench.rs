//! Benchmark statistics.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;

/// Sentinel for integer fields the output did not contain.
pub const MISSING: i64 = -1;

/// Sentinel for float fields the output did not contain.
pub const MISSING_F64: f64 = -1.0;

const MEAN_KEY: &str = "histogram_timer_rego_query_eval_ns_mean";
const P99_KEY: &str = "histogram_timer_rego_query_eval_ns_99%";

/// One row of a pretty benchmark table: `| key | value |`.
static TABLE_ROW: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?m)^\s*\|\s*([^|]+?)\s*\|\s*([-+]?[0-9][0-9.eE+-]*)\s*\|\s*$")
    .expect("invalid table row regex")
});

/// Which output shape the bench tool was asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BenchShape {
  #[default]
  Json,
  Table,
}

/// Statistics for one benchmarked query.
///
/// Fields absent from the tool output hold [`MISSING`] / [`MISSING_F64`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkStatistics {
  pub identity: String,
  pub iterations: i64,
  pub mean_ns: f64,
  pub p99_ns: f64,
  pub ns_per_op: i64,
  pub bytes_per_op: i64,
  pub allocs_per_op: i64,
  pub memory_kb: i64,
  pub peak_memory_mb: f64,
  pub throughput_ops: f64,
}

impl BenchmarkStatistics {
  pub fn empty(identity: impl Into<String>) -> Self {
    Self {
      identity: identity.into(),
      iterations: MISSING,
      mean_ns: MISSING_F64,
      p99_ns: MISSING_F64,
      ns_per_op: MISSING,
      bytes_per_op: MISSING,
      allocs_per_op: MISSING,
      memory_kb: MISSING,
      peak_memory_mb: MISSING_F64,
      throughput_ops: MISSING_F64,
    }
  }

  /// Latency used for ranking: the mean eval time, else ns/op.
  pub fn latency_ns(&self) -> Option<f64> {
    if self.mean_ns >= 0.0 {
      Some(self.mean_ns)
    } else if self.ns_per_op >= 0 {
      Some(self.ns_per_op as f64)
    } else {
      None
    }
  }

  /// Fill in throughput from latency if the output did not report it.
  fn finish(mut self) -> Self {
    if self.throughput_ops < 0.0
      && let Some(latency) = self.latency_ns()
      && latency > 0.0
    {
      self.throughput_ops = 1e9 / latency;
    }
    self
  }
}

#[derive(Debug, Deserialize)]
struct RawBench {
  #[serde(rename = "N")]
  n: Option<i64>,
  #[serde(rename = "T")]
  t: Option<i64>,
  #[serde(rename = "MemBytes")]
  mem_bytes: Option<i64>,
  #[serde(rename = "MemAllocs")]
  mem_allocs: Option<i64>,
  #[serde(rename = "Extra", default)]
  extra: serde_json::Map<String, Value>,
}

/// Parse the JSON form of `opa bench` output.
///
/// Text around the outermost braces (log lines, warnings) is ignored.
pub fn parse_bench_json(identity: &str, text: &str) -> Result<BenchmarkStatistics, ParseError> {
  const EXPECTED: &str = "benchmark JSON";

  let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
    return Err(ParseError::unparseable(EXPECTED, "no JSON object found"));
  };
  if end < start {
    return Err(ParseError::unparseable(EXPECTED, "no JSON object found"));
  }

  let raw: RawBench = serde_json::from_str(&text[start..=end])?;
  let mut stats = BenchmarkStatistics::empty(identity);

  if let Some(n) = raw.n {
    stats.iterations = n;
  }
  if let Some(bytes) = raw.mem_bytes {
    stats.memory_kb = bytes / 1024;
  }

  if let Some(n) = raw.n.filter(|n| *n > 0) {
    if let Some(t) = raw.t {
      stats.ns_per_op = t / n;
    }
    if let Some(bytes) = raw.mem_bytes {
      stats.bytes_per_op = bytes / n;
    }
    if let Some(allocs) = raw.mem_allocs {
      stats.allocs_per_op = allocs / n;
    }
  }

  if let Some(mean) = raw.extra.get(MEAN_KEY).and_then(Value::as_f64) {
    stats.mean_ns = mean;
  }
  if let Some(p99) = raw.extra.get(P99_KEY).and_then(Value::as_f64) {
    stats.p99_ns = p99;
  }

  Ok(stats.finish())
}

/// Parse the pretty table form of `opa bench` output.
pub fn parse_bench_table(identity: &str, text: &str) -> Result<BenchmarkStatistics, ParseError> {
  const EXPECTED: &str = "benchmark table";

  if text.trim_start().starts_with('{') {
    return Err(ParseError::unparseable(EXPECTED, "input looks like JSON"));
  }

  let mut stats = BenchmarkStatistics::empty(identity);
  let mut rows = 0;

  for caps in TABLE_ROW.captures_iter(text) {
    let key = caps[1].trim();
    let Ok(value) = caps[2].parse::<f64>() else {
      continue;
    };
    rows += 1;

    match key {
      "samples" | "N" => stats.iterations = value as i64,
      "ns/op" => stats.ns_per_op = value as i64,
      "B/op" => stats.bytes_per_op = value as i64,
      "allocs/op" => stats.allocs_per_op = value as i64,
      "ops/s" => stats.throughput_ops = value,
      "peak_mb" => stats.peak_memory_mb = value,
      MEAN_KEY => stats.mean_ns = value,
      P99_KEY => stats.p99_ns = value,
      _ => {}
    }
  }

  if rows == 0 {
    return Err(ParseError::unparseable(EXPECTED, "no `| key | value |` rows"));
  }

  Ok(stats.finish())
}

/// Parse bench output of a declared shape.
pub fn parse_bench(
  identity: &str,
  text: &str,
  shape: BenchShape,
) -> Result<BenchmarkStatistics, ParseError> {
  match shape {
    BenchShape::Json => parse_bench_json(identity, text),
    BenchShape::Table => parse_bench_table(identity, text),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const JSON: &str = r#"{
    "N": 100,
    "T": 60000,
    "MemBytes": 2048,
    "MemAllocs": 300,
    "Extra": {
      "histogram_timer_rego_query_eval_ns_mean": 500,
      "histogram_timer_rego_query_eval_ns_99%": 900
    }
  }"#;

  const TABLE: &str = "\
+-----------------------------------------+------------+
| samples                                 |      22383 |
| ns/op                                   |      52217 |
| B/op                                    |       6608 |
| allocs/op                               |        113 |
| histogram_timer_rego_query_eval_ns_mean |      46891 |
| histogram_timer_rego_query_eval_ns_99%  |     122389 |
+-----------------------------------------+------------+
";

  #[test]
  fn test_parse_json() {
    let stats = parse_bench_json("data.authz.allow", JSON).unwrap();

    assert_eq!(stats.identity, "data.authz.allow");
    assert_eq!(stats.iterations, 100);
    assert_eq!(stats.memory_kb, 2);
    assert_eq!(stats.mean_ns, 500.0);
    assert_eq!(stats.p99_ns, 900.0);
    assert_eq!(stats.ns_per_op, 600);
    assert_eq!(stats.bytes_per_op, 20);
    assert_eq!(stats.allocs_per_op, 3);
    assert_eq!(stats.throughput_ops, 2_000_000.0);
    assert_eq!(stats.peak_memory_mb, MISSING_F64);
  }

  #[test]
  fn test_parse_json_with_surrounding_noise() {
    let text = format!("warning: deprecated flag\n{}\n", JSON);
    let stats = parse_bench_json("q", &text).unwrap();
    assert_eq!(stats.iterations, 100);
  }

  #[test]
  fn test_parse_json_missing_fields_use_sentinel() {
    let stats = parse_bench_json("q", r#"{"N": 10}"#).unwrap();

    assert_eq!(stats.iterations, 10);
    assert_eq!(stats.memory_kb, MISSING);
    assert_eq!(stats.mean_ns, MISSING_F64);
    assert_eq!(stats.latency_ns(), None);
    assert_eq!(stats.throughput_ops, MISSING_F64);
  }

  #[test]
  fn test_parse_table() {
    let stats = parse_bench_table("q", TABLE).unwrap();

    assert_eq!(stats.iterations, 22383);
    assert_eq!(stats.ns_per_op, 52217);
    assert_eq!(stats.bytes_per_op, 6608);
    assert_eq!(stats.allocs_per_op, 113);
    assert_eq!(stats.mean_ns, 46891.0);
    assert_eq!(stats.p99_ns, 122389.0);
    assert_eq!(stats.memory_kb, MISSING);
  }

  #[test]
  fn test_latency_falls_back_to_ns_per_op() {
    let table = "| ns/op | 250 |\n";
    let stats = parse_bench_table("q", table).unwrap();

    assert_eq!(stats.latency_ns(), Some(250.0));
    assert_eq!(stats.throughput_ops, 4_000_000.0);
  }

  #[test]
  fn test_wrong_shape_is_unparseable() {
    assert!(matches!(
      parse_bench_json("q", TABLE),
      Err(ParseError::Unparseable { .. })
    ));
    assert!(matches!(
      parse_bench_table("q", JSON),
      Err(ParseError::Unparseable { .. })
    ));
    assert!(matches!(
      parse_bench("q", "", BenchShape::Table),
      Err(ParseError::Unparseable { .. })
    ));
  }

  #[test]
  fn test_malformed_json_is_json_error() {
    assert!(matches!(
      parse_bench_json("q", "{ N: }"),
      Err(ParseError::Json(_))
    ));
  }
}
