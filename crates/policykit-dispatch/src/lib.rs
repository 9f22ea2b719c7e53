//! Policykit Dispatch
//!
//! One bounded fan-out-and-join primitive shared by every policykit
//! operation (lint, format, test, bench).
//!
//! # Architecture
//!
//! ```text
//! Dispatcher::dispatch(items, exec, cancel)
//! ├── semaphore(max_workers) - one permit per running unit, FIFO start
//! ├── per item: UnitScope (child token + deadline) -> exec(item, scope)
//! │   └── ExecutionOutcome (always populated, even on failure)
//! ├── Aggregator - mutex-guarded map keyed by identity + first failure
//! └── join_all -> AggregateResult
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = Dispatcher::new(DispatchConfig::new(4, Duration::from_secs(15))?)?;
//! let result = dispatcher
//!   .dispatch(items, |item, scope| async move { run(item, scope).await }, &cancel)
//!   .await;
//!
//! if let Some(err) = result.error() {
//!   eprintln!("{}", err);
//! }
//! ```

mod aggregate;
mod dispatcher;
mod item;
mod outcome;
mod scope;

pub use aggregate::{AggregateResult, Aggregator, BatchError, FirstFailure};
pub use dispatcher::{CompletionCallback, DEFAULT_ABANDON_GRACE, Dispatcher, dispatch};
pub use item::{Identify, WorkIdentity, WorkItem};
pub use outcome::{ExecutionError, ExecutionOutcome, UnitState};
pub use scope::UnitScope;

pub use policykit_config::{ConfigError, DispatchConfig};
