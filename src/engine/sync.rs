use super::trigger::{RefreshHandle, RefreshTrigger, WakeReason};
use crate::config::Config;
use crate::error::SyncError;
use crate::maps::{compile, MapWriter, WriteReport};
use crate::postfix::MailServer;
use crate::stats::SyncStats;
use crate::store::{retry_until_ready, Backoff, EntryStore, Fingerprint};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct ApplySummary {
    pub fingerprint: Fingerprint,
    pub total_entries: usize,
    pub written: WriteReport,
    pub command_failures: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Fingerprint matched the last applied one; nothing was touched.
    Unchanged,
    /// Maps were rewritten and handed to the mail server.
    Applied(ApplySummary),
    /// Only the mail-server step was re-run after an earlier failure.
    Reapplied { command_failures: usize },
    /// Writing the maps failed; the previous files are still in place.
    Aborted(SyncError),
    /// Shutdown was requested while waiting on the store.
    Cancelled,
}

/// Mirrors the blocklist table into Postfix maps.
///
/// Strictly sequential: a cycle (fetch, compile, write, apply) always runs to
/// completion once started. Shutdown is only observed while waiting.
pub struct SyncEngine {
    store: Arc<dyn EntryStore>,
    mail_server: Arc<dyn MailServer>,
    writer: MapWriter,
    trigger: RefreshTrigger,
    stats: Arc<SyncStats>,
    interval: Duration,
    backoff: Backoff,
    last_applied: Option<Fingerprint>,
    pattern_support: Option<bool>,
    warned_unenforced: bool,
    apply_pending: bool,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn EntryStore>,
        mail_server: Arc<dyn MailServer>,
        writer: MapWriter,
        stats: Arc<SyncStats>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            store,
            mail_server,
            writer,
            trigger: RefreshTrigger::new(),
            stats,
            interval: defaults.check_interval(),
            backoff: Backoff::new(defaults.backoff.initial(), defaults.backoff.max()),
            last_applied: None,
            pattern_support: None,
            warned_unenforced: false,
            apply_pending: false,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn EntryStore>,
        mail_server: Arc<dyn MailServer>,
        stats: Arc<SyncStats>,
    ) -> Self {
        Self::new(store, mail_server, MapWriter::new(config.map_paths()), stats)
            .with_interval(config.check_interval())
            .with_backoff(Backoff::new(config.backoff.initial(), config.backoff.max()))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.trigger.handle()
    }

    pub fn listen_for_signal(&self) -> std::io::Result<()> {
        self.trigger.listen_for_signal()
    }

    pub fn last_applied(&self) -> Option<Fingerprint> {
        self.last_applied.clone()
    }

    pub fn stats(&self) -> &Arc<SyncStats> {
        &self.stats
    }

    /// Waits for the store to become reachable and probes the mail server
    /// once. Returns false if cancelled first.
    pub async fn start(&mut self, cancel: &CancellationToken) -> bool {
        let store = &*self.store;
        let connected = retry_until_ready(
            "Store connection",
            &mut self.backoff,
            &self.stats,
            cancel,
            move || store.connect(),
        )
        .await;
        if connected.is_none() {
            return false;
        }

        let supported = self.mail_server.has_advanced_pattern_support().await;
        debug!("Mail server pattern map support: {}", supported);
        self.pattern_support = Some(supported);
        true
    }

    /// One fetch-compare-apply pass.
    pub async fn run_cycle(
        &mut self,
        reason: WakeReason,
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        self.stats.inc_cycles();
        debug!(
            "Sync cycle start (reason={:?}, last_applied={:?})",
            reason, self.last_applied
        );

        let store = &*self.store;
        let Some(fingerprint) = retry_until_ready(
            "Fingerprint query",
            &mut self.backoff,
            &self.stats,
            cancel,
            move || store.fetch_fingerprint(),
        )
        .await
        else {
            return CycleOutcome::Cancelled;
        };

        if self.last_applied.as_ref() == Some(&fingerprint) {
            if self.apply_pending && reason == WakeReason::Notified {
                return self.reapply().await;
            }
            debug!("Fingerprint {} unchanged; nothing to do", fingerprint);
            self.stats.inc_unchanged();
            return CycleOutcome::Unchanged;
        }

        let Some(entries) = retry_until_ready(
            "Entry fetch",
            &mut self.backoff,
            &self.stats,
            cancel,
            move || store.fetch_entries(),
        )
        .await
        else {
            return CycleOutcome::Cancelled;
        };

        let maps = compile(&entries);
        info!(
            "Preparing maps from {} entries ({} pattern rules)",
            maps.total_entries(),
            maps.pattern_entries()
        );
        if self.pattern_support == Some(false)
            && maps.pattern_entries() > 0
            && !self.warned_unenforced
        {
            warn!(
                "{} pattern rule(s) will be written but not enforced: mail server has no pattern map support",
                maps.pattern_entries()
            );
            self.warned_unenforced = true;
            self.stats.inc_unenforced_warning();
        }

        let written = match self.writer.write(&maps) {
            Ok(report) => report,
            Err(e) => {
                error!("Map write failed, keeping previous maps: {}", e);
                self.stats.inc_compile_failure();
                return CycleOutcome::Aborted(e);
            }
        };

        let report = self.mail_server.apply(self.writer.paths()).await;
        let command_failures = report.failures();
        self.stats.add_command_failures(command_failures as u64);
        self.apply_pending = command_failures > 0;

        // The files on disk match this fingerprint even if postmap/reload
        // failed; a later change or forced refresh re-runs those.
        info!(
            "BLOCKER_APPLY maps_updated total_entries={} fingerprint={}",
            entries.len(),
            fingerprint
        );
        self.last_applied = Some(fingerprint.clone());
        self.stats.inc_applies();

        CycleOutcome::Applied(ApplySummary {
            fingerprint,
            total_entries: entries.len(),
            written,
            command_failures,
        })
    }

    async fn reapply(&mut self) -> CycleOutcome {
        info!("Forced refresh: retrying mail server apply after earlier failure");
        let report = self.mail_server.apply(self.writer.paths()).await;
        let command_failures = report.failures();
        self.stats.add_command_failures(command_failures as u64);
        self.apply_pending = command_failures > 0;
        CycleOutcome::Reapplied { command_failures }
    }

    /// Runs until `cancel` fires. The first cycle after start always
    /// rewrites the maps, since nothing has been applied by this process yet.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.start(&cancel).await {
            info!("Shutdown requested before the store became available");
            return;
        }

        let mut reason = WakeReason::Startup;
        loop {
            if let CycleOutcome::Cancelled = self.run_cycle(reason, &cancel).await {
                break;
            }
            let interval = self.interval;
            reason = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.trigger.wait_for_wake(interval) => r,
            };
            match reason {
                WakeReason::Notified => self.stats.inc_notified_wake(),
                _ => self.stats.inc_timer_wake(),
            }
        }
        info!("Sync loop stopped");
    }
}
