use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
  pub program: PathBuf,
  pub args: Vec<OsString>,
  /// Bytes written to the tool's stdin. `None` leaves stdin closed.
  pub stdin: Option<Vec<u8>>,
}

impl ToolInvocation {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      stdin: None,
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<S: AsRef<OsStr>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
    self
      .args
      .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
    self.stdin = Some(bytes.into());
    self
  }

  pub fn program_name(&self) -> String {
    self.program.display().to_string()
  }

  /// Shell-like rendering for logs. Not meant to be re-parsed.
  pub fn command_line(&self) -> String {
    let mut line = self.program_name();
    for arg in &self.args {
      line.push(' ');
      let arg = arg.to_string_lossy();
      if arg.contains(char::is_whitespace) {
        line.push('\'');
        line.push_str(&arg);
        line.push('\'');
      } else {
        line.push_str(&arg);
      }
    }
    line
  }
}
