use std::path::{Path, PathBuf};

use async_trait::async_trait;
use policykit_dispatch::{ExecutionError, ExecutionOutcome, UnitScope};
use policykit_executor::{ToolInvocation, execute_unit};
use policykit_metrics::{Violation, parse_lint_report};

/// Lints one policy file.
#[async_trait]
pub trait Linter: Send + Sync {
  /// Lint `path`. Violations make the outcome fail, and are carried in
  /// its details either way.
  async fn lint(&self, path: &Path, scope: &UnitScope) -> ExecutionOutcome<Vec<Violation>>;
}

/// [`Linter`] backed by `regal lint --format json`.
pub struct RegalLinter {
  program: PathBuf,
}

impl RegalLinter {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  fn invocation(&self, path: &Path) -> ToolInvocation {
    ToolInvocation::new(&self.program)
      .args(["lint", "--format", "json"])
      .arg(path)
  }
}

#[async_trait]
impl Linter for RegalLinter {
  async fn lint(&self, path: &Path, scope: &UnitScope) -> ExecutionOutcome<Vec<Violation>> {
    let identity = path.display().to_string();
    let invocation = self.invocation(path);

    let outcome = execute_unit(identity, &invocation, scope, |run| {
      parse_lint_report(&run.stdout_text())
    })
    .await;

    check_violations(outcome)
  }
}

/// Fail an outcome whose report lists violations.
///
/// The linter exits non-zero when it finds violations, so a parsed report
/// replaces the bare exit status with a count.
pub(crate) fn check_violations(
  outcome: ExecutionOutcome<Vec<Violation>>,
) -> ExecutionOutcome<Vec<Violation>> {
  let count = outcome.details.as_ref().map_or(0, Vec::len);
  let exit_only = matches!(outcome.error, None | Some(ExecutionError::NonZeroExit { .. }));

  if count > 0 && exit_only {
    outcome.with_error(ExecutionError::failed(format!("{} violation(s)", count)))
  } else {
    outcome
  }
}
