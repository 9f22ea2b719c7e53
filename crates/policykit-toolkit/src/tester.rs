use std::path::{Path, PathBuf};

use policykit_dispatch::{ExecutionOutcome, Identify, UnitScope, WorkItem};
use policykit_executor::{ToolInvocation, execute_unit};
use policykit_metrics::{CoverageSummary, summarize_coverage};

/// Options shared by every test directory in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOptions {
  /// Data document passed with `--data`.
  pub input: Option<PathBuf>,
  /// Extra flags appended verbatim.
  pub flags: Vec<String>,
}

impl TestOptions {
  pub fn item(&self, dir: impl Into<PathBuf>) -> WorkItem {
    WorkItem::directory(dir)
      .with_input(self.input.clone())
      .with_args(self.flags.iter().cloned())
  }
}

pub(crate) fn test_invocation(opa: &Path, item: &WorkItem) -> ToolInvocation {
  let mut invocation = ToolInvocation::new(opa)
    .arg("test")
    .arg(item.identity())
    .args(["--format=json", "--coverage", "--ignore=.*"]);
  if let Some(input) = &item.input {
    invocation = invocation.arg("--data").arg(input);
  }
  invocation.args(&item.extra_args)
}

/// Run `opa test` with coverage for one directory item.
pub async fn test_dir(
  opa: &Path,
  item: &WorkItem,
  scope: &UnitScope,
) -> ExecutionOutcome<CoverageSummary> {
  let invocation = test_invocation(opa, item);
  execute_unit(item.identity(), &invocation, scope, |run| {
    summarize_coverage(&run.stdout_text())
  })
  .await
}
