//! Result aggregation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::outcome::{ExecutionError, ExecutionOutcome};

/// The first failure recorded in a batch, in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirstFailure {
  pub identity: String,
  pub error: ExecutionError,
}

impl fmt::Display for FirstFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.identity, self.error)
  }
}

/// Batch-level error: how many units failed and which failed first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{failures} of {total} units failed (first: {first})")]
pub struct BatchError {
  pub failures: usize,
  pub total: usize,
  pub first: FirstFailure,
}

/// The joined result of one dispatch batch.
///
/// `outcomes` has no meaningful order; use [`AggregateResult::sorted`] for
/// display.
#[derive(Debug, Serialize)]
pub struct AggregateResult<D> {
  /// Correlates log lines of one batch.
  pub batch_id: String,
  pub outcomes: HashMap<String, ExecutionOutcome<D>>,
  /// First failure in completion order. Not stable across runs when
  /// several units fail close together.
  pub first_failure: Option<FirstFailure>,
  pub failure_count: usize,
}

impl<D> AggregateResult<D> {
  pub fn len(&self) -> usize {
    self.outcomes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.outcomes.is_empty()
  }

  /// True when no unit failed.
  pub fn succeeded(&self) -> bool {
    self.failure_count == 0
  }

  pub fn get(&self, identity: &str) -> Option<&ExecutionOutcome<D>> {
    self.outcomes.get(identity)
  }

  /// The batch-level error, present iff at least one unit failed.
  pub fn error(&self) -> Option<BatchError> {
    self.first_failure.clone().map(|first| BatchError {
      failures: self.failure_count,
      total: self.outcomes.len(),
      first,
    })
  }

  /// Outcomes ordered by identity.
  pub fn sorted(&self) -> Vec<&ExecutionOutcome<D>> {
    let mut outcomes: Vec<_> = self.outcomes.values().collect();
    outcomes.sort_by(|a, b| a.identity.cmp(&b.identity));
    outcomes
  }

  /// Failed outcomes ordered by identity.
  pub fn failures(&self) -> Vec<&ExecutionOutcome<D>> {
    self.sorted().into_iter().filter(|o| !o.success).collect()
  }
}

#[derive(Debug)]
struct AggregateState<D> {
  outcomes: HashMap<String, ExecutionOutcome<D>>,
  first_failure: Option<FirstFailure>,
}

/// Thread-safe accumulator of outcomes keyed by identity.
///
/// The lock is only held for the map insert and the first-failure slot
/// update, never across an executor call.
#[derive(Debug)]
pub struct Aggregator<D> {
  state: Mutex<AggregateState<D>>,
}

impl<D> Default for Aggregator<D> {
  fn default() -> Self {
    Self::new()
  }
}

impl<D> Aggregator<D> {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(AggregateState {
        outcomes: HashMap::new(),
        first_failure: None,
      }),
    }
  }

  /// Record one outcome. A repeated identity replaces the earlier outcome.
  pub fn record(&self, outcome: ExecutionOutcome<D>) {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.first_failure.is_none()
      && let Some(error) = &outcome.error
    {
      state.first_failure = Some(FirstFailure {
        identity: outcome.identity.clone(),
        error: error.clone(),
      });
    }
    state.outcomes.insert(outcome.identity.clone(), outcome);
  }

  pub fn contains(&self, identity: &str) -> bool {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    state.outcomes.contains_key(identity)
  }

  /// Consume the aggregator once every producer is done.
  pub fn finish(self, batch_id: impl Into<String>) -> AggregateResult<D> {
    let state = self
      .state
      .into_inner()
      .unwrap_or_else(PoisonError::into_inner);
    build_result(batch_id.into(), state.outcomes, state.first_failure)
  }
}

impl<D: Clone> Aggregator<D> {
  /// Copy out the current contents without consuming the aggregator.
  pub fn snapshot(&self, batch_id: impl Into<String>) -> AggregateResult<D> {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    build_result(
      batch_id.into(),
      state.outcomes.clone(),
      state.first_failure.clone(),
    )
  }
}

fn build_result<D>(
  batch_id: String,
  outcomes: HashMap<String, ExecutionOutcome<D>>,
  first_failure: Option<FirstFailure>,
) -> AggregateResult<D> {
  let failure_count = outcomes.values().filter(|o| !o.success).count();
  // A later duplicate may have replaced the only failure.
  let first_failure = if failure_count == 0 {
    None
  } else {
    first_failure
  };

  AggregateResult {
    batch_id,
    outcomes,
    first_failure,
    failure_count,
  }
}
