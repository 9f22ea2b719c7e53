//! Per-unit cancellation scope.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline used when `now + timeout` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Cancellation token and deadline for one running unit.
///
/// The token is a child of the batch's parent token, so cancelling the
/// batch cancels every scope. Reaching the deadline cancels only this
/// scope's token.
#[derive(Debug, Clone)]
pub struct UnitScope {
  cancel: CancellationToken,
  deadline: Instant,
}

impl UnitScope {
  /// Start a scope now, expiring after `timeout`.
  ///
  /// Timeouts too large to represent are treated as no practical deadline.
  pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
    let now = Instant::now();
    Self {
      cancel,
      deadline: now.checked_add(timeout).unwrap_or(now + FAR_FUTURE),
    }
  }

  pub fn token(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_expired(&self) -> bool {
    self.cancel.is_cancelled() || Instant::now() >= self.deadline
  }

  /// Resolves when the deadline passes or the scope is cancelled.
  pub async fn expired(&self) {
    tokio::select! {
      _ = self.cancel.cancelled() => {}
      _ = tokio::time::sleep_until(self.deadline) => {
        self.cancel.cancel();
      }
    }
  }
}
