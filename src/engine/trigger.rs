use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Why the sync loop woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Startup,
    Timer,
    Notified,
}

/// Cloneable "refresh now" sender. Notifications coalesce: while one is
/// pending, further ones are dropped.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Folds the polling timer and out-of-band refresh requests into one wake-up.
#[derive(Debug)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

impl RefreshTrigger {
    pub fn new() -> Self {
        // Single slot: a pending wake is a flag, not a queue.
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }

    pub fn handle(&self) -> RefreshHandle {
        RefreshHandle {
            tx: self.tx.clone(),
        }
    }

    /// Forwards SIGUSR1 into the trigger. The forwarding task only enqueues.
    pub fn listen_for_signal(&self) -> std::io::Result<()> {
        let mut usr1 = signal(SignalKind::user_defined1())?;
        let handle = self.handle();
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                debug!("SIGUSR1 received");
                handle.notify();
            }
        });
        info!("Blocker listening for SIGUSR1 to trigger refresh");
        Ok(())
    }

    /// Blocks until `interval` elapses or a notification arrives, then
    /// clears any pending notification so one event yields one wake.
    pub async fn wait_for_wake(&mut self, interval: Duration) -> WakeReason {
        let mut reason = tokio::select! {
            biased;
            Some(()) = self.rx.recv() => WakeReason::Notified,
            _ = tokio::time::sleep(interval) => WakeReason::Timer,
        };
        while self.rx.try_recv().is_ok() {
            reason = WakeReason::Notified;
        }
        reason
    }
}

impl Default for RefreshTrigger {
    fn default() -> Self {
        Self::new()
    }
}
