#![cfg(unix)]

use std::time::Duration;

use policykit_dispatch::{ExecutionError, UnitScope, UnitState};
use policykit_executor::{ToolInvocation, execute_unit, run_tool};
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> ToolInvocation {
  ToolInvocation::new("sh").arg("-c").arg(script)
}

fn scope(timeout: Duration) -> UnitScope {
  UnitScope::new(CancellationToken::new(), timeout)
}

#[tokio::test]
async fn test_captures_both_streams() {
  let run = run_tool(&sh("echo out; echo err 1>&2"), &scope(Duration::from_secs(10))).await;

  assert!(run.status.is_ok());
  assert!(run.combined.contains("out"));
  assert!(run.combined.contains("err"));
  assert_eq!(run.stdout_text(), "out\n");
}

#[tokio::test]
async fn test_nonzero_exit_keeps_output() {
  let run = run_tool(&sh("echo 'FAIL: test_deny'; exit 2"), &scope(Duration::from_secs(10))).await;

  assert_eq!(run.status, Err(ExecutionError::NonZeroExit { code: 2 }));
  assert!(run.combined.contains("FAIL: test_deny"));
}

#[tokio::test]
async fn test_missing_program_is_launch_failure() {
  let invocation = ToolInvocation::new("/nonexistent/policykit-tool");
  let run = run_tool(&invocation, &scope(Duration::from_secs(10))).await;

  assert!(matches!(run.status, Err(ExecutionError::Launch { .. })));
  assert!(run.combined.is_empty());
}

#[tokio::test]
async fn test_deadline_kills_tool_and_keeps_partial_output() {
  let started = std::time::Instant::now();
  let run = run_tool(
    &sh("echo before; exec sleep 30"),
    &scope(Duration::from_millis(300)),
  )
  .await;

  assert_eq!(run.status, Err(ExecutionError::DeadlineExceeded));
  assert!(run.combined.contains("before"));
  assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_parent_cancel_stops_tool() {
  let parent = CancellationToken::new();
  let unit = UnitScope::new(parent.child_token(), Duration::from_secs(60));

  let trigger = parent.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.cancel();
  });

  let run = run_tool(&sh("exec sleep 30"), &unit).await;
  assert_eq!(run.status, Err(ExecutionError::DeadlineExceeded));
}

#[tokio::test]
async fn test_stdin_is_fed_to_tool() {
  let invocation = ToolInvocation::new("cat").stdin("package authz\n");
  let run = run_tool(&invocation, &scope(Duration::from_secs(10))).await;

  assert!(run.status.is_ok());
  assert_eq!(run.stdout, b"package authz\n");
}

#[tokio::test]
async fn test_execute_unit_derives_details() {
  let outcome = execute_unit(
    "count",
    &sh("echo 42"),
    &scope(Duration::from_secs(10)),
    |run| run.stdout_text().trim().parse::<u32>(),
  )
  .await;

  assert!(outcome.success);
  assert_eq!(outcome.details, Some(42));
  assert!(outcome.parse_error.is_none());
}

#[tokio::test]
async fn test_execute_unit_parse_error_does_not_change_status() {
  let outcome = execute_unit(
    "garbage",
    &sh("echo not-a-number"),
    &scope(Duration::from_secs(10)),
    |run| run.stdout_text().trim().parse::<u32>(),
  )
  .await;

  assert!(outcome.success);
  assert!(outcome.details.is_none());
  assert!(outcome.parse_error.is_some());
}

#[tokio::test]
async fn test_execute_unit_timeout_skips_derive() {
  let outcome = execute_unit(
    "slow",
    &sh("exec sleep 30"),
    &scope(Duration::from_millis(200)),
    |_run| -> Result<(), String> { panic!("derive must not run") },
  )
  .await;

  assert_eq!(outcome.state(), UnitState::TimedOut);
  assert!(outcome.parse_error.is_none());
}
