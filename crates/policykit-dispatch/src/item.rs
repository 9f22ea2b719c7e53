//! Work items.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Anything the dispatcher can key an outcome by.
///
/// Identities must be unique within one batch.
pub trait Identify {
  fn identity(&self) -> String;
}

impl Identify for String {
  fn identity(&self) -> String {
    self.clone()
  }
}

impl Identify for PathBuf {
  fn identity(&self) -> String {
    self.display().to_string()
  }
}

/// What a work item refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WorkIdentity {
  /// A single policy file (lint, format).
  File(PathBuf),
  /// A directory of policies and tests (test).
  Directory(PathBuf),
  /// A query string (bench).
  Query(String),
}

impl fmt::Display for WorkIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::File(path) | Self::Directory(path) => write!(f, "{}", path.display()),
      Self::Query(query) => f.write_str(query),
    }
  }
}

/// One independent unit of work.
///
/// Built by the caller or the discovery step and consumed exactly once
/// by one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
  pub identity: WorkIdentity,
  /// Input document reference for this item.
  pub input: Option<PathBuf>,
  /// Flags appended to this item's tool invocation.
  pub extra_args: Vec<String>,
}

impl WorkItem {
  pub fn new(identity: WorkIdentity) -> Self {
    Self {
      identity,
      input: None,
      extra_args: Vec::new(),
    }
  }

  pub fn file(path: impl Into<PathBuf>) -> Self {
    Self::new(WorkIdentity::File(path.into()))
  }

  pub fn directory(path: impl Into<PathBuf>) -> Self {
    Self::new(WorkIdentity::Directory(path.into()))
  }

  pub fn query(query: impl Into<String>) -> Self {
    Self::new(WorkIdentity::Query(query.into()))
  }

  pub fn with_input(mut self, input: Option<PathBuf>) -> Self {
    self.input = input;
    self
  }

  pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
    self.extra_args.extend(args);
    self
  }
}

impl Identify for WorkItem {
  fn identity(&self) -> String {
    self.identity.to_string()
  }
}
