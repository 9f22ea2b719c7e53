use std::fmt::Display;

use policykit_dispatch::{ExecutionError, ExecutionOutcome, UnitScope};

use crate::invocation::ToolInvocation;
use crate::run::{ToolRun, run_tool};

/// Run one tool invocation and build the unit's outcome.
///
/// `derive` extracts structured details from the run. It is skipped when
/// the tool never started or was killed at its deadline. A derive error
/// lands in `parse_error` and does not change `success`.
pub async fn execute_unit<D, E, F>(
  identity: impl Into<String>,
  invocation: &ToolInvocation,
  scope: &UnitScope,
  derive: F,
) -> ExecutionOutcome<D>
where
  F: FnOnce(&ToolRun) -> Result<D, E>,
  E: Display,
{
  let run = run_tool(invocation, scope).await;

  let skip_derive = matches!(
    run.status,
    Err(ExecutionError::Launch { .. } | ExecutionError::DeadlineExceeded)
  );
  let derived = if skip_derive { None } else { Some(derive(&run)) };

  let outcome = ExecutionOutcome::new(identity, run.combined, run.elapsed, run.status);
  match derived {
    Some(Ok(details)) => outcome.with_details(details),
    Some(Err(e)) => outcome.with_parse_error(e.to_string()),
    None => outcome,
  }
}
