use crate::error::SyncResult;
use crate::stats::SyncStats;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exponential backoff: starts at `initial`, doubles per failure, never
/// exceeds `max`. There is no attempt limit.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// Failed attempts since the last reset.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Records a failed attempt and returns how long to wait before the next.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempts += 1;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Log at WARN on attempts 1, 2, 4, 8, ... so a long outage doesn't flood
    /// the log.
    pub fn is_loud(attempt: u64) -> bool {
        attempt.is_power_of_two()
    }
}

/// Runs `op` until it succeeds, sleeping per `backoff` between failures.
///
/// Returns `None` only when `cancel` fires while waiting.
pub async fn retry_until_ready<T, F, Fut>(
    what: &str,
    backoff: &mut Backoff,
    stats: &SyncStats,
    cancel: &CancellationToken,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    loop {
        match op().await {
            Ok(value) => {
                if backoff.attempts() > 0 {
                    info!(
                        "{} succeeded after {} failed attempt(s)",
                        what,
                        backoff.attempts()
                    );
                }
                backoff.reset();
                return Some(value);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                let attempt = backoff.attempts();
                stats.inc_store_retry();
                if Backoff::is_loud(attempt) {
                    warn!(
                        "{} failed (attempt {}): {}; retrying in {:?}",
                        what, attempt, e, delay
                    );
                } else {
                    debug!(
                        "{} failed (attempt {}): {}; retrying in {:?}",
                        what, attempt, e, delay
                    );
                }
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
