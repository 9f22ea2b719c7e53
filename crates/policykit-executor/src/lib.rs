//! Policykit Executor
//!
//! Runs one external tool invocation inside a [`UnitScope`] and turns the
//! result into an [`ExecutionOutcome`].
//!
//! ```text
//! execute_unit(identity, invocation, scope, derive)
//! └── run_tool
//!     ├── spawn (kill_on_drop, piped stdout/stderr, optional stdin)
//!     ├── pump stdout + stderr into one combined buffer
//!     ├── select: child exit | scope expiry -> kill + reap
//!     └── ToolRun { combined, stdout, elapsed, status }
//! ```
//!
//! Output is captured up to the moment of exit or kill, so a timed-out
//! unit still reports what the tool printed.
//!
//! [`UnitScope`]: policykit_dispatch::UnitScope
//! [`ExecutionOutcome`]: policykit_dispatch::ExecutionOutcome

mod invocation;
mod run;
mod unit;

pub use invocation::ToolInvocation;
pub use run::{DRAIN_GRACE, REAP_GRACE, ToolRun, run_tool};
pub use unit::execute_unit;
