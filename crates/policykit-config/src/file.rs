//! Config file loading and layering.
//!
//! ```json
//! {
//!   "workers": 8,
//!   "timeout_ms": 30000,
//!   "opa_path": "/usr/local/bin/opa",
//!   "regal_path": "regal",
//!   "format": "markdown",
//!   "input": "data/input.json",
//!   "test_flags": ["--v0-compatible"]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::{DEFAULT_MAX_WORKERS, DEFAULT_TIMEOUT, DispatchConfig};
use crate::error::ConfigError;
use crate::format::OutputFormat;

/// File name looked up in the working directory.
const LOCAL_FILE_NAME: &str = "policykit.json";

/// Contents of a `policykit.json` file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
  pub workers: Option<usize>,
  pub timeout_ms: Option<u64>,
  pub opa_path: Option<PathBuf>,
  pub regal_path: Option<PathBuf>,
  pub format: Option<OutputFormat>,
  /// Input document passed to `opa test --data` / `opa bench -i`.
  pub input: Option<PathBuf>,
  /// Extra flags appended to every `opa test` invocation.
  pub test_flags: Vec<String>,
}

impl FileConfig {
  /// Load a config file from an explicit path.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load the first config file found in the default locations.
  ///
  /// Returns an empty config when none exists.
  pub fn discover(working_dir: &Path) -> Result<Self, ConfigError> {
    for candidate in Self::default_paths(working_dir) {
      if candidate.is_file() {
        return Self::load(&candidate);
      }
    }
    Ok(Self::default())
  }

  /// Default lookup order: `./policykit.json`, then `<config dir>/policykit/config.json`.
  pub fn default_paths(working_dir: &Path) -> Vec<PathBuf> {
    let mut paths = vec![working_dir.join(LOCAL_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
      paths.push(dir.join("policykit").join("config.json"));
    }
    paths
  }
}

/// Values supplied on the command line. They take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
  pub workers: Option<usize>,
  pub timeout: Option<Duration>,
  pub opa_path: Option<PathBuf>,
  pub regal_path: Option<PathBuf>,
  pub format: Option<OutputFormat>,
  pub input: Option<PathBuf>,
}

/// Paths of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
  pub opa: PathBuf,
  pub regal: PathBuf,
}

impl Default for ToolPaths {
  fn default() -> Self {
    Self {
      opa: PathBuf::from("opa"),
      regal: PathBuf::from("regal"),
    }
  }
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
  pub dispatch: DispatchConfig,
  pub tools: ToolPaths,
  pub format: OutputFormat,
  pub input: Option<PathBuf>,
  pub test_flags: Vec<String>,
}

impl Settings {
  /// Layer overrides over the file over the defaults, then validate.
  pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self, ConfigError> {
    let max_workers = overrides
      .workers
      .or(file.workers)
      .unwrap_or(DEFAULT_MAX_WORKERS);
    let timeout = overrides
      .timeout
      .or(file.timeout_ms.map(Duration::from_millis))
      .unwrap_or(DEFAULT_TIMEOUT);

    let defaults = ToolPaths::default();
    let tools = ToolPaths {
      opa: overrides.opa_path.or(file.opa_path).unwrap_or(defaults.opa),
      regal: overrides
        .regal_path
        .or(file.regal_path)
        .unwrap_or(defaults.regal),
    };

    Ok(Self {
      dispatch: DispatchConfig::new(max_workers, timeout)?,
      tools,
      format: overrides.format.or(file.format).unwrap_or_default(),
      input: overrides.input.or(file.input),
      test_flags: file.test_flags,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve_defaults() {
    let settings = Settings::resolve(FileConfig::default(), Overrides::default()).unwrap();
    assert_eq!(settings.dispatch.max_workers, DEFAULT_MAX_WORKERS);
    assert_eq!(settings.dispatch.timeout, DEFAULT_TIMEOUT);
    assert_eq!(settings.tools, ToolPaths::default());
    assert_eq!(settings.format, OutputFormat::Text);
  }

  #[test]
  fn test_overrides_win_over_file() {
    let file = FileConfig {
      workers: Some(2),
      timeout_ms: Some(1_000),
      format: Some(OutputFormat::Markdown),
      ..Default::default()
    };
    let overrides = Overrides {
      workers: Some(6),
      ..Default::default()
    };

    let settings = Settings::resolve(file, overrides).unwrap();
    assert_eq!(settings.dispatch.max_workers, 6);
    assert_eq!(settings.dispatch.timeout, Duration::from_secs(1));
    assert_eq!(settings.format, OutputFormat::Markdown);
  }

  #[test]
  fn test_zero_workers_in_file_is_an_error() {
    let file = FileConfig {
      workers: Some(0),
      ..Default::default()
    };
    let err = Settings::resolve(file, Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidWorkers { .. }));
  }

  #[test]
  fn test_huge_timeout_in_file_is_an_error() {
    let file = FileConfig {
      timeout_ms: Some(u64::MAX),
      ..Default::default()
    };
    let err = Settings::resolve(file, Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::TimeoutTooLong { .. }));
  }

  #[test]
  fn test_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policykit.json");
    std::fs::write(
      &path,
      r#"{"workers": 3, "opa_path": "/opt/opa", "test_flags": ["--v1-compatible"]}"#,
    )
    .unwrap();

    let file = FileConfig::discover(dir.path()).unwrap();
    assert_eq!(file.workers, Some(3));
    assert_eq!(file.opa_path, Some(PathBuf::from("/opt/opa")));
    assert_eq!(file.test_flags, vec!["--v1-compatible".to_string()]);
  }

  #[test]
  fn test_load_rejects_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"wrokers": 3}"#).unwrap();

    let err = FileConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn test_load_missing_file() {
    let err = FileConfig::load(Path::new("/nonexistent/policykit.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }
}
