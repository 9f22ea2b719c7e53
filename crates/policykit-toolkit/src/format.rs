//! Formatting and atomic write-back.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use policykit_dispatch::{ExecutionError, ExecutionOutcome, UnitScope};
use policykit_executor::{ToolInvocation, run_tool};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::FormatFailure;

/// Formats policy source.
#[async_trait]
pub trait Formatter: Send + Sync {
  async fn format(&self, source: &[u8], scope: &UnitScope) -> Result<Vec<u8>, FormatFailure>;
}

/// [`Formatter`] backed by `opa fmt`, fed through stdin.
pub struct OpaFormatter {
  program: PathBuf,
}

impl OpaFormatter {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

#[async_trait]
impl Formatter for OpaFormatter {
  async fn format(&self, source: &[u8], scope: &UnitScope) -> Result<Vec<u8>, FormatFailure> {
    let invocation = ToolInvocation::new(&self.program).arg("fmt").stdin(source);
    let run = run_tool(&invocation, scope).await;

    match run.status {
      Ok(()) => Ok(run.stdout),
      Err(error) => Err(FormatFailure::new(error, run.combined)),
    }
  }
}

/// What to do with formatted output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
  /// Write changed files back in place.
  pub write: bool,
  /// Fail files whose formatting would change.
  pub check: bool,
}

/// Per-file result of a format run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatChange {
  pub changed: bool,
  pub written: bool,
  #[serde(skip)]
  pub formatted: Vec<u8>,
}

/// Format one file as a dispatch unit.
pub async fn format_file(
  formatter: &dyn Formatter,
  path: &Path,
  options: FormatOptions,
  scope: &UnitScope,
) -> ExecutionOutcome<FormatChange> {
  let identity = path.display().to_string();
  let started = Instant::now();

  let source = match tokio::fs::read(path).await {
    Ok(source) => source,
    Err(e) => {
      return ExecutionOutcome::new(
        identity,
        String::new(),
        started.elapsed(),
        Err(ExecutionError::io(format!("read failed: {}", e))),
      );
    }
  };

  let formatted = match formatter.format(&source, scope).await {
    Ok(formatted) => formatted,
    Err(failure) => {
      return ExecutionOutcome::new(
        identity,
        failure.diagnostics,
        started.elapsed(),
        Err(failure.error),
      );
    }
  };

  let changed = formatted != source;
  let mut written = false;

  if changed && options.write && !options.check {
    if let Err(e) = write_atomic(path, &formatted).await {
      return ExecutionOutcome::new(
        identity,
        String::new(),
        started.elapsed(),
        Err(ExecutionError::io(format!("write failed: {}", e))),
      );
    }
    written = true;
    debug!(path = %path.display(), "file_reformatted");
  }

  let outcome = ExecutionOutcome::new(identity, String::new(), started.elapsed(), Ok(()))
    .with_details(FormatChange {
      changed,
      written,
      formatted,
    });

  if changed && options.check {
    outcome.with_error(ExecutionError::failed("not formatted"))
  } else {
    outcome
  }
}

/// Replace `path` with `contents` without ever exposing a partial file.
///
/// Writes a temp file in the same directory, copies the original
/// permissions onto it, then renames it over the original.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
  let path = path.to_path_buf();
  let contents = contents.to_vec();

  tokio::task::spawn_blocking(move || {
    let dir = match path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
      _ => PathBuf::from("."),
    };
    let permissions = std::fs::metadata(&path)?.permissions();

    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
    temp.write_all(&contents)?;
    temp.as_file().sync_all()?;
    std::fs::set_permissions(temp.path(), permissions)?;
    temp.persist(&path).map_err(|e| e.error)?;
    Ok(())
  })
  .await
  .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tokio_util::sync::CancellationToken;

  use super::*;

  /// Trims trailing whitespace on each line and ends with one newline.
  struct TrimFormatter;

  #[async_trait]
  impl Formatter for TrimFormatter {
    async fn format(&self, source: &[u8], _scope: &UnitScope) -> Result<Vec<u8>, FormatFailure> {
      let text = std::str::from_utf8(source)
        .map_err(|e| FormatFailure::new(ExecutionError::failed("invalid utf-8"), e.to_string()))?;
      let mut out: String = text.lines().map(|l| format!("{}\n", l.trim_end())).collect();
      if out.is_empty() {
        out.push('\n');
      }
      Ok(out.into_bytes())
    }
  }

  fn scope() -> UnitScope {
    UnitScope::new(CancellationToken::new(), Duration::from_secs(5))
  }

  #[tokio::test]
  async fn test_write_reformats_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.rego");
    std::fs::write(&path, "package a   \nallow := true  ").unwrap();

    let options = FormatOptions {
      write: true,
      check: false,
    };
    let outcome = format_file(&TrimFormatter, &path, options, &scope()).await;

    assert!(outcome.success);
    let change = outcome.details.unwrap();
    assert!(change.changed);
    assert!(change.written);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "package a\nallow := true\n");

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
  }

  #[tokio::test]
  async fn test_check_mode_is_idempotent_on_formatted_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.rego");
    std::fs::write(&path, "package a\n").unwrap();
    let before = std::fs::metadata(&path).unwrap().modified().unwrap();

    let options = FormatOptions {
      write: true,
      check: true,
    };
    let outcome = format_file(&TrimFormatter, &path, options, &scope()).await;

    assert!(outcome.success);
    let change = outcome.details.unwrap();
    assert!(!change.changed);
    assert!(!change.written);
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), before);
  }

  #[tokio::test]
  async fn test_check_mode_fails_unformatted_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.rego");
    std::fs::write(&path, "package a   \n").unwrap();

    let options = FormatOptions {
      write: false,
      check: true,
    };
    let outcome = format_file(&TrimFormatter, &path, options, &scope()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error, Some(ExecutionError::failed("not formatted")));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "package a   \n");
  }

  #[tokio::test]
  async fn test_unreadable_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = format_file(
      &TrimFormatter,
      &dir.path().join("missing.rego"),
      FormatOptions::default(),
      &scope(),
    )
    .await;

    assert!(matches!(outcome.error, Some(ExecutionError::Io { .. })));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_write_atomic_preserves_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.rego");
    std::fs::write(&path, "old").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

    write_atomic(&path, b"new").await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);
  }
}
