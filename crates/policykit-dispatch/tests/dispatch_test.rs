use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use policykit_dispatch::{
  ConfigError, DispatchConfig, Dispatcher, ExecutionError, ExecutionOutcome, UnitScope, UnitState,
  dispatch,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn config(workers: usize, timeout: Duration) -> DispatchConfig {
  DispatchConfig::new(workers, timeout).unwrap()
}

fn names(n: usize) -> Vec<String> {
  (0..n).map(|i| format!("item-{:02}", i)).collect()
}

fn ok(identity: String, started: Instant) -> ExecutionOutcome<()> {
  ExecutionOutcome::new(identity, "ok", started.elapsed(), Ok(()))
}

#[tokio::test]
async fn test_every_item_has_an_outcome() {
  let cancel = CancellationToken::new();
  let result = dispatch(
    names(10),
    config(3, Duration::from_secs(5)),
    |id: String, _scope| async move {
      let started = Instant::now();
      let failing = id.ends_with('3') || id.ends_with('7');
      let status = if failing {
        Err(ExecutionError::NonZeroExit { code: 1 })
      } else {
        Ok(())
      };
      ExecutionOutcome::<()>::new(id, "output", started.elapsed(), status)
    },
    &cancel,
  )
  .await
  .unwrap();

  assert_eq!(result.len(), 10);
  assert_eq!(result.failure_count, 2);
  assert!(!result.succeeded());

  let err = result.error().unwrap();
  assert_eq!(err.failures, 2);
  assert!(["item-03", "item-07"].contains(&err.first.identity.as_str()));

  // Failed outcomes keep their output.
  assert_eq!(result.get("item-03").unwrap().output, "output");
}

#[tokio::test]
async fn test_all_succeed_no_error() {
  let cancel = CancellationToken::new();
  let result = dispatch(
    names(5),
    config(2, Duration::from_secs(5)),
    |id: String, _scope| async move { ok(id, Instant::now()) },
    &cancel,
  )
  .await
  .unwrap();

  assert_eq!(result.len(), 5);
  assert!(result.succeeded());
  assert!(result.error().is_none());
  assert!(!result.batch_id.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_cap() {
  let running = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let cancel = CancellationToken::new();

  let exec = {
    let running = running.clone();
    let peak = peak.clone();
    move |id: String, _scope: UnitScope| {
      let running = running.clone();
      let peak = peak.clone();
      async move {
        let started = Instant::now();
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        running.fetch_sub(1, Ordering::SeqCst);
        ok(id, started)
      }
    }
  };

  let result = dispatch(names(12), config(3, Duration::from_secs(5)), exec, &cancel)
    .await
    .unwrap();

  assert_eq!(result.len(), 12);
  assert!(result.succeeded());
  assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancelled_before_dispatch_launches_nothing() {
  let launched = Arc::new(AtomicUsize::new(0));
  let cancel = CancellationToken::new();
  cancel.cancel();

  let exec = {
    let launched = launched.clone();
    move |id: String, _scope: UnitScope| {
      launched.fetch_add(1, Ordering::SeqCst);
      async move { ok(id, Instant::now()) }
    }
  };

  let result = dispatch(names(6), config(2, Duration::from_secs(5)), exec, &cancel)
    .await
    .unwrap();

  assert_eq!(launched.load(Ordering::SeqCst), 0);
  assert_eq!(result.len(), 6);
  assert_eq!(result.failure_count, 6);
  for outcome in result.outcomes.values() {
    assert_eq!(outcome.state(), UnitState::TimedOut);
  }
}

#[tokio::test]
async fn test_cancel_mid_flight_returns_promptly() {
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    trigger.cancel();
  });

  let run = dispatch(
    names(4),
    config(2, Duration::from_secs(60)),
    |id: String, scope: UnitScope| async move {
      let started = Instant::now();
      scope.token().cancelled().await;
      ExecutionOutcome::<()>::new(
        id,
        "partial",
        started.elapsed(),
        Err(ExecutionError::DeadlineExceeded),
      )
    },
    &cancel,
  );

  let result = tokio::time::timeout(Duration::from_secs(2), run)
    .await
    .expect("dispatch should return after cancellation")
    .unwrap();

  assert_eq!(result.len(), 4);
  assert!(
    result
      .outcomes
      .values()
      .all(|o| o.state() == UnitState::TimedOut)
  );

  let partial = result
    .outcomes
    .values()
    .filter(|o| o.output == "partial")
    .count();
  assert_eq!(partial, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unit_timeout_is_per_item() {
  let cancel = CancellationToken::new();
  let result = dispatch(
    vec!["slow".to_string(), "fast".to_string()],
    config(2, Duration::from_millis(50)),
    |id: String, scope: UnitScope| async move {
      let started = Instant::now();
      let work = if id == "slow" {
        Duration::from_secs(10)
      } else {
        Duration::from_millis(5)
      };
      tokio::select! {
        _ = tokio::time::sleep(work) => ok(id, started),
        _ = scope.expired() => ExecutionOutcome::new(
          id,
          "",
          started.elapsed(),
          Err(ExecutionError::DeadlineExceeded),
        ),
      }
    },
    &cancel,
  )
  .await
  .unwrap();

  assert_eq!(result.get("slow").unwrap().state(), UnitState::TimedOut);
  assert_eq!(result.get("fast").unwrap().state(), UnitState::Succeeded);
  assert_eq!(result.failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unit_ignoring_deadline_is_abandoned() {
  let cancel = CancellationToken::new();
  let dispatcher = Dispatcher::new(config(1, Duration::from_millis(50)))
    .unwrap()
    .with_abandon_grace(Duration::from_millis(100));

  let started = Instant::now();
  let result = dispatcher
    .dispatch(
      vec!["stuck".to_string()],
      |id: String, _scope| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        ok(id, Instant::now())
      },
      &cancel,
    )
    .await;

  assert!(started.elapsed() < Duration::from_secs(1));
  let outcome = result.get("stuck").unwrap();
  assert_eq!(outcome.error, Some(ExecutionError::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_first_failure_follows_completion_order() {
  let cancel = CancellationToken::new();
  let result = dispatch(
    vec!["a".to_string(), "b".to_string()],
    config(2, Duration::from_secs(5)),
    |id: String, _scope| async move {
      let started = Instant::now();
      let delay = if id == "a" { 100 } else { 10 };
      tokio::time::sleep(Duration::from_millis(delay)).await;
      ExecutionOutcome::<()>::new(
        id,
        "",
        started.elapsed(),
        Err(ExecutionError::NonZeroExit { code: 1 }),
      )
    },
    &cancel,
  )
  .await
  .unwrap();

  assert_eq!(result.failure_count, 2);
  assert_eq!(result.first_failure.unwrap().identity, "b");
}

#[tokio::test]
async fn test_callback_runs_once_per_unit() {
  let seen = Arc::new(AtomicUsize::new(0));
  let cancel = CancellationToken::new();
  let dispatcher = {
    let seen = seen.clone();
    Dispatcher::new(config(4, Duration::from_secs(5)))
      .unwrap()
      .on_complete(move |_outcome: &ExecutionOutcome<()>| {
        seen.fetch_add(1, Ordering::SeqCst);
      })
  };

  let result = dispatcher
    .dispatch(
      names(9),
      |id: String, _scope| async move { ok(id, Instant::now()) },
      &cancel,
    )
    .await;

  assert_eq!(result.len(), 9);
  assert_eq!(seen.load(Ordering::SeqCst), 9);
}

fn recording_dispatcher(
  workers: usize,
) -> (Dispatcher<()>, Arc<Mutex<Vec<(String, UnitState)>>>) {
  let seen: Arc<Mutex<Vec<(String, UnitState)>>> = Arc::default();
  let dispatcher = {
    let seen = seen.clone();
    Dispatcher::new(config(workers, Duration::from_secs(5)))
      .unwrap()
      .on_complete(move |outcome: &ExecutionOutcome<()>| {
        seen
          .lock()
          .unwrap()
          .push((outcome.identity.clone(), outcome.state()));
      })
  };
  (dispatcher, seen)
}

#[tokio::test]
async fn test_callback_runs_for_units_never_launched() {
  let (dispatcher, seen) = recording_dispatcher(2);
  let launched = Arc::new(AtomicUsize::new(0));
  let cancel = CancellationToken::new();
  cancel.cancel();

  let counter = launched.clone();
  let result = dispatcher
    .dispatch(
      names(4),
      move |id: String, _scope: UnitScope| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { ok(id, Instant::now()) }
      },
      &cancel,
    )
    .await;

  assert_eq!(launched.load(Ordering::SeqCst), 0);
  assert_eq!(result.len(), 4);

  let mut seen = seen.lock().unwrap().clone();
  seen.sort_by(|a, b| a.0.cmp(&b.0));
  let expected: Vec<(String, UnitState)> = names(4)
    .into_iter()
    .map(|id| (id, UnitState::TimedOut))
    .collect();
  assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_callback_runs_for_panicked_unit() {
  let (dispatcher, seen) = recording_dispatcher(2);
  let cancel = CancellationToken::new();

  let result = dispatcher
    .dispatch(
      names(3),
      |id: String, _scope: UnitScope| async move {
        if id == "item-01" {
          panic!("boom");
        }
        ok(id, Instant::now())
      },
      &cancel,
    )
    .await;

  assert_eq!(result.len(), 3);

  let seen = seen.lock().unwrap();
  assert_eq!(seen.len(), 3);
  assert!(seen.contains(&("item-01".to_string(), UnitState::Failed)));
}

#[tokio::test]
async fn test_zero_workers_is_a_config_error() {
  let invalid = DispatchConfig {
    max_workers: 0,
    timeout: Duration::from_secs(1),
  };
  let cancel = CancellationToken::new();

  let result = dispatch(
    names(3),
    invalid,
    |id: String, _scope| async move { ok(id, Instant::now()) },
    &cancel,
  )
  .await;

  assert!(matches!(result, Err(ConfigError::InvalidWorkers { value: 0 })));
}

#[tokio::test]
async fn test_huge_timeout_is_a_config_error() {
  let invalid = DispatchConfig {
    max_workers: 2,
    timeout: Duration::from_secs(u64::MAX / 2),
  };

  let result = Dispatcher::<()>::new(invalid);

  assert!(matches!(result, Err(ConfigError::TimeoutTooLong { .. })));
}

#[tokio::test]
async fn test_panicking_unit_does_not_lose_siblings() {
  let cancel = CancellationToken::new();
  let result = dispatch(
    names(4),
    config(2, Duration::from_secs(5)),
    |id: String, _scope| async move {
      if id == "item-01" {
        panic!("executor bug");
      }
      ok(id, Instant::now())
    },
    &cancel,
  )
  .await
  .unwrap();

  assert_eq!(result.len(), 4);
  assert_eq!(result.failure_count, 1);
  assert!(matches!(
    result.get("item-01").unwrap().error,
    Some(ExecutionError::Panicked { .. })
  ));
  assert!(result.get("item-02").unwrap().success);
}

#[tokio::test]
async fn test_empty_batch() {
  let cancel = CancellationToken::new();
  let result = dispatch(
    Vec::<String>::new(),
    config(2, Duration::from_secs(5)),
    |id: String, _scope| async move { ok(id, Instant::now()) },
    &cancel,
  )
  .await
  .unwrap();

  assert!(result.is_empty());
  assert!(result.succeeded());
}
