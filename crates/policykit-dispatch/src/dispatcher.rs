//! Bounded concurrent dispatch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use policykit_config::{ConfigError, DispatchConfig};

use crate::aggregate::{AggregateResult, Aggregator};
use crate::item::Identify;
use crate::outcome::{ExecutionError, ExecutionOutcome, UnitState};
use crate::scope::UnitScope;

/// Invoked once per unit, after its outcome is in the aggregate.
///
/// Runs on worker tasks, possibly several at once.
pub type CompletionCallback<D> = Arc<dyn Fn(&ExecutionOutcome<D>) + Send + Sync>;

/// How long a unit may keep running past its deadline before the
/// dispatcher stops waiting for it.
pub const DEFAULT_ABANDON_GRACE: Duration = Duration::from_secs(5);

/// Runs a batch of work items with at most `max_workers` in flight.
pub struct Dispatcher<D> {
  config: DispatchConfig,
  on_complete: Option<CompletionCallback<D>>,
  abandon_grace: Duration,
}

impl<D> Dispatcher<D>
where
  D: Clone + Send + 'static,
{
  /// Create a dispatcher. Fails on a zero worker count or a zero timeout.
  pub fn new(config: DispatchConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      config,
      on_complete: None,
      abandon_grace: DEFAULT_ABANDON_GRACE,
    })
  }

  /// Register a progress callback.
  pub fn on_complete(
    mut self,
    callback: impl Fn(&ExecutionOutcome<D>) + Send + Sync + 'static,
  ) -> Self {
    self.on_complete = Some(Arc::new(callback));
    self
  }

  pub fn with_abandon_grace(mut self, grace: Duration) -> Self {
    self.abandon_grace = grace;
    self
  }

  /// Run every item through `exec` and join the outcomes.
  ///
  /// Items acquire worker slots in input order. Once `cancel` fires, items
  /// that have not started are recorded as timed out without being
  /// launched, and running units observe cancellation through their
  /// [`UnitScope`]. Always returns one outcome per distinct identity.
  #[instrument(
    name = "batch_dispatch",
    skip(self, items, exec, cancel),
    fields(
      items = items.len(),
      max_workers = self.config.max_workers,
    )
  )]
  pub async fn dispatch<I, F, Fut>(
    &self,
    items: Vec<I>,
    exec: F,
    cancel: &CancellationToken,
  ) -> AggregateResult<D>
  where
    I: Identify + Send + 'static,
    F: Fn(I, UnitScope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExecutionOutcome<D>> + Send + 'static,
  {
    let batch_id = uuid::Uuid::new_v4().to_string();
    let aggregator = Arc::new(Aggregator::new());
    let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
    let exec = Arc::new(exec);

    info!(
      batch_id = %batch_id,
      timeout_ms = self.config.timeout.as_millis() as u64,
      "batch_started"
    );

    let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(items.len());

    for item in items {
      let identity = item.identity();

      let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = semaphore.clone().acquire_owned() => permit.ok(),
      };

      let Some(permit) = permit else {
        debug!(batch_id = %batch_id, identity = %identity, "unit_skipped");
        self.complete(&aggregator, ExecutionOutcome::cancelled(identity));
        continue;
      };

      let unit = Unit {
        identity: identity.clone(),
        batch_id: batch_id.clone(),
        cancel: cancel.clone(),
        timeout: self.config.timeout,
        grace: self.abandon_grace,
        aggregator: aggregator.clone(),
        on_complete: self.on_complete.clone(),
      };
      let exec = exec.clone();
      let span = info_span!("unit", identity = %identity);

      let handle = tokio::spawn(
        async move {
          let outcome = unit.run(item, exec.as_ref()).await;
          drop(permit);
          unit.finish(outcome);
        }
        .instrument(span),
      );
      handles.push((identity, handle));
    }

    let (identities, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let joined = futures::future::join_all(handles).await;

    for (identity, result) in identities.into_iter().zip(joined) {
      if let Err(e) = result
        && !aggregator.contains(&identity)
      {
        error!(batch_id = %batch_id, identity = %identity, error = %e, "unit_panicked");
        self.complete(&aggregator, ExecutionOutcome::panicked(identity, e.to_string()));
      }
    }

    let result = match Arc::try_unwrap(aggregator) {
      Ok(aggregator) => aggregator.finish(batch_id),
      Err(shared) => shared.snapshot(batch_id),
    };

    info!(
      batch_id = %result.batch_id,
      units = result.len(),
      failures = result.failure_count,
      "batch_joined"
    );

    result
  }

  fn complete(&self, aggregator: &Aggregator<D>, outcome: ExecutionOutcome<D>) {
    record_and_notify(aggregator, self.on_complete.as_ref(), outcome);
  }
}

/// Everything a spawned unit needs besides its item.
struct Unit<D> {
  identity: String,
  batch_id: String,
  cancel: CancellationToken,
  timeout: Duration,
  grace: Duration,
  aggregator: Arc<Aggregator<D>>,
  on_complete: Option<CompletionCallback<D>>,
}

impl<D> Unit<D>
where
  D: Clone + Send + 'static,
{
  async fn run<I, F, Fut>(&self, item: I, exec: &F) -> ExecutionOutcome<D>
  where
    F: Fn(I, UnitScope) -> Fut,
    Fut: Future<Output = ExecutionOutcome<D>>,
  {
    let scope = UnitScope::new(self.cancel.child_token(), self.timeout);
    if scope.token().is_cancelled() {
      return ExecutionOutcome::cancelled(self.identity.clone());
    }

    let started = Instant::now();
    debug!(batch_id = %self.batch_id, "unit_started");

    tokio::select! {
      biased;
      outcome = exec(item, scope.clone()) => outcome,
      _ = abandon_after(&scope, self.grace) => {
        warn!(
          batch_id = %self.batch_id,
          grace_ms = self.grace.as_millis() as u64,
          "unit_abandoned"
        );
        ExecutionOutcome::new(
          self.identity.clone(),
          String::new(),
          started.elapsed(),
          Err(ExecutionError::DeadlineExceeded),
        )
      }
    }
  }

  fn finish(&self, outcome: ExecutionOutcome<D>) {
    let elapsed_ms = outcome.elapsed.as_millis() as u64;
    match outcome.state() {
      UnitState::Succeeded => {
        info!(batch_id = %self.batch_id, elapsed_ms, "unit_completed");
      }
      UnitState::TimedOut => {
        warn!(batch_id = %self.batch_id, elapsed_ms, "unit_timed_out");
      }
      UnitState::Failed => {
        let error = outcome.error.as_ref().map(ToString::to_string).unwrap_or_default();
        warn!(batch_id = %self.batch_id, elapsed_ms, error = %error, "unit_failed");
      }
    }

    record_and_notify(&self.aggregator, self.on_complete.as_ref(), outcome);
  }
}

/// Resolves `grace` after the scope expires, for executors that ignore
/// their deadline.
async fn abandon_after(scope: &UnitScope, grace: Duration) {
  scope.expired().await;
  tokio::time::sleep(grace).await;
}

fn record_and_notify<D: Clone>(
  aggregator: &Aggregator<D>,
  on_complete: Option<&CompletionCallback<D>>,
  outcome: ExecutionOutcome<D>,
) {
  let notify = on_complete.map(|callback| (callback, outcome.clone()));
  aggregator.record(outcome);
  if let Some((callback, outcome)) = notify {
    callback(&outcome);
  }
}

/// One-shot dispatch without a progress callback.
pub async fn dispatch<I, D, F, Fut>(
  items: Vec<I>,
  config: DispatchConfig,
  exec: F,
  cancel: &CancellationToken,
) -> Result<AggregateResult<D>, ConfigError>
where
  I: Identify + Send + 'static,
  D: Clone + Send + 'static,
  F: Fn(I, UnitScope) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ExecutionOutcome<D>> + Send + 'static,
{
  let dispatcher = Dispatcher::new(config)?;
  Ok(dispatcher.dispatch(items, exec, cancel).await)
}
