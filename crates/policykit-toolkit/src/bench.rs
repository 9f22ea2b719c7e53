use std::collections::HashMap;
use std::path::{Path, PathBuf};

use policykit_dispatch::{AggregateResult, ExecutionOutcome, Identify, UnitScope, WorkItem};
use policykit_executor::{ToolInvocation, execute_unit};
use policykit_metrics::{BenchShape, BenchmarkStatistics, parse_bench};

/// Options shared by every query in a bench batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchOptions {
  /// Input document passed with `-i`.
  pub input: Option<PathBuf>,
  /// Data and policy paths, each passed with `-d`.
  pub data: Vec<PathBuf>,
  /// Extra flags appended verbatim.
  pub flags: Vec<String>,
}

impl BenchOptions {
  pub fn item(&self, query: impl Into<String>) -> WorkItem {
    let data = self
      .data
      .iter()
      .flat_map(|path| ["-d".to_string(), path.to_string_lossy().into_owned()]);

    WorkItem::query(query)
      .with_input(self.input.clone())
      .with_args(data.chain(self.flags.iter().cloned()))
  }
}

pub(crate) fn bench_invocation(opa: &Path, item: &WorkItem) -> ToolInvocation {
  let mut invocation = ToolInvocation::new(opa)
    .arg("bench")
    .arg(item.identity())
    .arg("--format=json");
  if let Some(input) = &item.input {
    invocation = invocation.arg("-i").arg(input);
  }
  invocation.args(&item.extra_args)
}

/// Benchmark one query item.
pub async fn bench_query(
  opa: &Path,
  item: &WorkItem,
  scope: &UnitScope,
) -> ExecutionOutcome<BenchmarkStatistics> {
  let query = item.identity();
  let invocation = bench_invocation(opa, item);
  execute_unit(query.clone(), &invocation, scope, |run| {
    parse_bench(&query, &run.stdout_text(), BenchShape::Json)
  })
  .await
}

/// Statistics of every successful, parsed benchmark in a batch.
pub fn statistics(
  aggregate: &AggregateResult<BenchmarkStatistics>,
) -> HashMap<String, BenchmarkStatistics> {
  aggregate
    .outcomes
    .iter()
    .filter(|(_, outcome)| outcome.success)
    .filter_map(|(identity, outcome)| {
      outcome
        .details
        .clone()
        .map(|stats| (identity.clone(), stats))
    })
    .collect()
}
