use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Default)]
pub struct SyncStats {
    cycles: AtomicU64,
    timer_wakes: AtomicU64,
    notified_wakes: AtomicU64,
    unchanged: AtomicU64,
    applies: AtomicU64,
    store_retries: AtomicU64,
    compile_failures: AtomicU64,
    command_failures: AtomicU64,
    unenforced_warnings: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub timer_wakes: u64,
    pub notified_wakes: u64,
    pub unchanged: u64,
    pub applies: u64,
    pub store_retries: u64,
    pub compile_failures: u64,
    pub command_failures: u64,
    pub unenforced_warnings: u64,
}

impl SyncStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_cycles(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timer_wake(&self) {
        self.timer_wakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notified_wake(&self) {
        self.notified_wakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_applies(&self) {
        self.applies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_store_retry(&self) {
        self.store_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_compile_failure(&self) {
        self.compile_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_command_failures(&self, n: u64) {
        self.command_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_unenforced_warning(&self) {
        self.unenforced_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            timer_wakes: self.timer_wakes.load(Ordering::Relaxed),
            notified_wakes: self.notified_wakes.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            applies: self.applies.load(Ordering::Relaxed),
            store_retries: self.store_retries.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            unenforced_warnings: self.unenforced_warnings.load(Ordering::Relaxed),
        }
    }

    /// Spawns the periodic `STATS DUMP` logger; it stops with `cancel`.
    pub fn spawn_reporter(self: &Arc<Self>, every: Duration, cancel: CancellationToken) {
        let stats = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => stats.dump_stats(),
                }
            }
        });
    }

    fn dump_stats(&self) {
        let s = self.snapshot();
        info!(
            "STATS DUMP: Cycles: {} (timer {}, notified {}), Unchanged: {}, Applies: {}, StoreRetries: {}, CompileFailures: {}, CommandFailures: {}, UnenforcedWarnings: {}",
            s.cycles,
            s.timer_wakes,
            s.notified_wakes,
            s.unchanged,
            s.applies,
            s.store_retries,
            s.compile_failures,
            s.command_failures,
            s.unenforced_warnings
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = SyncStats::new();
        stats.inc_cycles();
        stats.inc_cycles();
        stats.inc_applies();
        stats.add_command_failures(2);

        let snap = stats.snapshot();
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.applies, 1);
        assert_eq!(snap.command_failures, 2);
        assert_eq!(snap.unchanged, 0);
    }
}
