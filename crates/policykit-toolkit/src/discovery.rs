//! Work item discovery.
//!
//! Walks root paths on the async filesystem. Hidden directories (`.git`,
//! `.opa`) are skipped. Each root is walked independently: a root that
//! cannot be read yields one [`DiscoveryError`] and contributes nothing,
//! while the other roots are still walked.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::DiscoveryError;

/// Paths found across all roots, plus per-root failures.
#[derive(Debug, Default)]
pub struct Discovery {
  /// Sorted and de-duplicated.
  pub paths: Vec<PathBuf>,
  pub errors: Vec<DiscoveryError>,
}

/// Every `*.rego` file under `roots`. A root that is itself a file is
/// taken as-is.
pub async fn find_policy_files(roots: &[PathBuf]) -> Discovery {
  discover(roots, |entry| match entry {
    Entry::File(path) if is_rego(path) => Some(path.to_path_buf()),
    _ => None,
  })
  .await
}

/// Every directory holding tests: the parent of each `*_test.rego` file
/// and the parent of each directory named `test`.
pub async fn find_test_dirs(roots: &[PathBuf]) -> Discovery {
  discover(roots, |entry| match entry {
    Entry::File(path) if is_test_file(path) => parent_of(path),
    Entry::Dir(path) if path.file_name().is_some_and(|n| n == "test") => parent_of(path),
    _ => None,
  })
  .await
}

enum Entry<'a> {
  File(&'a Path),
  Dir(&'a Path),
}

async fn discover<F>(roots: &[PathBuf], select: F) -> Discovery
where
  F: Fn(Entry<'_>) -> Option<PathBuf>,
{
  let mut found = BTreeSet::new();
  let mut errors = Vec::new();

  for root in roots {
    match walk(root, &select).await {
      Ok(paths) => {
        debug!(root = %root.display(), count = paths.len(), "root_walked");
        found.extend(paths);
      }
      Err(e) => {
        warn!(root = %root.display(), error = %e, "root_walk_failed");
        errors.push(DiscoveryError::new(root, e.to_string()));
      }
    }
  }

  Discovery {
    paths: found.into_iter().collect(),
    errors,
  }
}

async fn walk<F>(root: &Path, select: &F) -> Result<Vec<PathBuf>, io::Error>
where
  F: Fn(Entry<'_>) -> Option<PathBuf>,
{
  let mut found = Vec::new();

  let metadata = fs::metadata(root).await?;
  if !metadata.is_dir() {
    found.extend(select(Entry::File(root)));
    return Ok(found);
  }

  found.extend(select(Entry::Dir(root)));
  let mut pending = vec![root.to_path_buf()];

  while let Some(dir) = pending.pop() {
    let mut entries = fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if is_hidden(&path) {
        continue;
      }

      let file_type = entry.file_type().await?;
      if file_type.is_dir() {
        found.extend(select(Entry::Dir(&path)));
        pending.push(path);
      } else if file_type.is_file() {
        found.extend(select(Entry::File(&path)));
      }
    }
  }

  Ok(found)
}

fn is_rego(path: &Path) -> bool {
  path.extension().is_some_and(|ext| ext == "rego")
}

fn is_test_file(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .is_some_and(|n| n.ends_with("_test.rego"))
}

fn is_hidden(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .is_some_and(|n| n.starts_with('.'))
}

fn parent_of(path: &Path) -> Option<PathBuf> {
  path
    .parent()
    .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
    .map(Path::to_path_buf)
}
