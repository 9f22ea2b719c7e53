//! Policykit Config
//!
//! Configuration types shared by every policykit crate.
//!
//! Configuration is layered:
//! - built-in defaults ([`DEFAULT_MAX_WORKERS`], [`DEFAULT_TIMEOUT`])
//! - a JSON config file (`policykit.json` in the working directory, or
//!   `<config dir>/policykit/config.json`, or `--config=<path>`)
//! - command line overrides
//!
//! The defaults only exist at this edge. [`DispatchConfig`] itself has no
//! `Default` impl: the dispatcher always receives explicit, validated limits.

mod dispatch;
mod error;
mod file;
mod format;

pub use dispatch::{
  DEFAULT_MAX_WORKERS, DEFAULT_TIMEOUT, DispatchConfig, MAX_TIMEOUT, parse_duration,
};
pub use error::ConfigError;
pub use file::{FileConfig, Overrides, Settings, ToolPaths};
pub use format::{OutputFormat, SummaryFormat};
