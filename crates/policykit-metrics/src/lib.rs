//! Policykit Metrics
//!
//! Turns raw tool output into structured data:
//!
//! - benchmark statistics from `opa bench` (JSON or pretty table)
//! - coverage summaries from `opa test --coverage`
//! - lint violations from `regal lint --format json`
//!
//! Parsers never panic on foreign input. Missing numeric fields take the
//! [`MISSING`] sentinel; input of the wrong shape is a [`ParseError`].

mod bench;
mod coverage;
mod error;
mod lint;

pub use bench::{
  BenchShape, BenchmarkStatistics, MISSING, MISSING_F64, parse_bench, parse_bench_json,
  parse_bench_table,
};
pub use coverage::{CoverageSummary, summarize_coverage};
pub use error::ParseError;
pub use lint::{Violation, parse_lint_report};
