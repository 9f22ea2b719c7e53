//! Policykit Toolkit
//!
//! The four policy operations, each a discovery step followed by one
//! bounded dispatch:
//!
//! | operation | work item            | tool                         | details           |
//! |-----------|----------------------|------------------------------|-------------------|
//! | lint      | `*.rego` file        | `regal lint --format json`   | `Vec<Violation>`  |
//! | format    | `*.rego` file        | `opa fmt` (stdin)            | `FormatChange`    |
//! | test      | directory with tests | `opa test --coverage`        | `CoverageSummary` |
//! | bench     | query string         | `opa bench --format=json`    | `BenchmarkStatistics` |
//!
//! Linting and formatting go through the [`Linter`] and [`Formatter`]
//! traits so they can be replaced without spawning processes.

mod bench;
mod discovery;
mod error;
mod format;
mod lint;
mod tester;
mod toolkit;

pub use bench::{BenchOptions, bench_query, statistics};
pub use discovery::{Discovery, find_policy_files, find_test_dirs};
pub use error::{DiscoveryError, FormatFailure};
pub use format::{FormatChange, FormatOptions, Formatter, OpaFormatter, format_file, write_atomic};
pub use lint::{Linter, RegalLinter};
pub use tester::{TestOptions, test_dir};
pub use toolkit::{Operation, Progress, ProgressCallback, Toolkit};
