//! Policykit Report
//!
//! Rendering of operation results:
//!
//! - [`render_summary`] ranks benchmark statistics fastest first
//! - [`render_batch`] lists every attempted work item with its status
//!
//! Both are pure functions of their input and return the full text.

mod batch;
mod summary;

pub use batch::{Annotation, BatchReport, BatchRow, Describe, render_batch};
pub use summary::{RankedEntry, RankedSummary, rank, render_summary, summary_document};
