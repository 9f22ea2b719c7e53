//! Process spawning and output capture.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use policykit_dispatch::{ExecutionError, UnitScope};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::invocation::ToolInvocation;

/// How long to wait for output pipes to close after the tool exits.
///
/// Grandchildren can hold the pipes open; their output is dropped.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How long to wait for a killed tool to be reaped.
pub const REAP_GRACE: Duration = Duration::from_secs(2);

/// Raw result of one tool run.
#[derive(Debug, Clone)]
pub struct ToolRun {
  /// Interleaved stdout and stderr, in arrival order.
  pub combined: String,
  /// Stdout alone, for tools whose machine-readable output goes there.
  pub stdout: Vec<u8>,
  pub elapsed: Duration,
  pub status: Result<(), ExecutionError>,
}

impl ToolRun {
  fn launch_failure(invocation: &ToolInvocation, message: String, elapsed: Duration) -> Self {
    Self {
      combined: String::new(),
      stdout: Vec::new(),
      elapsed,
      status: Err(ExecutionError::Launch {
        program: invocation.program_name(),
        message,
      }),
    }
  }

  pub fn stdout_text(&self) -> String {
    String::from_utf8_lossy(&self.stdout).into_owned()
  }
}

#[derive(Default)]
struct Capture {
  combined: Vec<u8>,
  stdout: Vec<u8>,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Run `invocation` until it exits or `scope` expires.
///
/// On expiry the tool is killed and the status is
/// [`ExecutionError::DeadlineExceeded`]; output printed before the kill is
/// kept.
pub async fn run_tool(invocation: &ToolInvocation, scope: &UnitScope) -> ToolRun {
  let started = Instant::now();

  let mut command = Command::new(&invocation.program);
  command
    .args(&invocation.args)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  if invocation.stdin.is_some() {
    command.stdin(Stdio::piped());
  } else {
    command.stdin(Stdio::null());
  }

  let mut child = match command.spawn() {
    Ok(child) => child,
    Err(e) => {
      warn!(program = %invocation.program_name(), error = %e, "tool_launch_failed");
      return ToolRun::launch_failure(invocation, e.to_string(), started.elapsed());
    }
  };

  debug!(
    command = %invocation.command_line(),
    pid = child.id().unwrap_or_default(),
    "tool_spawned"
  );

  let capture: SharedCapture = Arc::default();
  let stdout_pump = child
    .stdout
    .take()
    .map(|pipe| tokio::spawn(pump(pipe, capture.clone(), true)));
  let stderr_pump = child
    .stderr
    .take()
    .map(|pipe| tokio::spawn(pump(pipe, capture.clone(), false)));

  let feeder = match (child.stdin.take(), invocation.stdin.clone()) {
    (Some(mut pipe), Some(bytes)) => Some(tokio::spawn(async move {
      // A tool that exits without reading stdin closes the pipe early.
      let _ = pipe.write_all(&bytes).await;
      let _ = pipe.shutdown().await;
    })),
    _ => None,
  };

  let waited = tokio::select! {
    waited = child.wait() => Some(waited),
    _ = scope.expired() => None,
  };

  let status = match waited {
    Some(Ok(status)) => classify(status),
    Some(Err(e)) => Err(ExecutionError::io(format!("failed to wait for tool: {}", e))),
    None => {
      warn!(program = %invocation.program_name(), "tool_deadline_exceeded");
      if let Err(e) = child.start_kill() {
        debug!(error = %e, "tool_kill_failed");
      }
      if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
        warn!(program = %invocation.program_name(), "tool_not_reaped");
      }
      Err(ExecutionError::DeadlineExceeded)
    }
  };

  drain(stdout_pump).await;
  drain(stderr_pump).await;
  if let Some(feeder) = feeder {
    feeder.abort();
  }

  let elapsed = started.elapsed();
  let capture = std::mem::take(&mut *capture.lock().unwrap_or_else(PoisonError::into_inner));

  debug!(
    program = %invocation.program_name(),
    elapsed_ms = elapsed.as_millis() as u64,
    success = status.is_ok(),
    "tool_exited"
  );

  ToolRun {
    combined: String::from_utf8_lossy(&capture.combined).into_owned(),
    stdout: capture.stdout,
    elapsed,
    status,
  }
}

fn classify(status: ExitStatus) -> Result<(), ExecutionError> {
  if status.success() {
    return Ok(());
  }
  match status.code() {
    Some(code) => Err(ExecutionError::NonZeroExit { code }),
    None => Err(ExecutionError::Terminated),
  }
}

async fn pump<R>(mut pipe: R, capture: SharedCapture, is_stdout: bool)
where
  R: AsyncRead + Unpin,
{
  let mut buf = [0u8; 8192];
  loop {
    match pipe.read(&mut buf).await {
      Ok(0) => break,
      Ok(n) => {
        let mut capture = capture.lock().unwrap_or_else(PoisonError::into_inner);
        capture.combined.extend_from_slice(&buf[..n]);
        if is_stdout {
          capture.stdout.extend_from_slice(&buf[..n]);
        }
      }
      Err(e) => {
        debug!(error = %e, "tool_pipe_read_failed");
        break;
      }
    }
  }
}

async fn drain(pump: Option<JoinHandle<()>>) {
  let Some(mut pump) = pump else {
    return;
  };
  if tokio::time::timeout(DRAIN_GRACE, &mut pump).await.is_err() {
    pump.abort();
  }
}
