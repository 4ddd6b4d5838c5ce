use super::traits::EntryStore;
use super::types::{BlockEntry, Fingerprint};
use crate::error::{SyncError, SyncResult};
use chrono::{Duration, NaiveDateTime};
use std::sync::{Mutex, MutexGuard};

/// In-process store used by tests and dry runs.
///
/// Each mutation advances a logical clock by one second, so `updated_at`
/// never goes backwards. `fail_next` makes the next N calls report the store
/// as unavailable.
#[derive(Debug)]
pub struct MemoryEntryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    entries: Vec<BlockEntry>,
    next_id: i64,
    clock: NaiveDateTime,
    failures_remaining: u32,
    calls: u64,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: Vec::new(),
                next_id: 1,
                clock: NaiveDateTime::default(),
                failures_remaining: 0,
                calls: 0,
            }),
        }
    }

    fn state(&self) -> SyncResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| SyncError::store("memory store lock poisoned"))
    }

    /// Inserts an entry and returns its id.
    pub fn insert(&self, pattern: &str, is_regex: bool, test_mode: bool) -> SyncResult<i64> {
        let mut state = self.state()?;
        let id = state.next_id;
        state.next_id += 1;
        let ts = state.tick();
        state.entries.push(BlockEntry {
            id,
            pattern: pattern.to_string(),
            is_regex,
            test_mode,
            updated_at: Some(ts),
        });
        Ok(id)
    }

    /// Flips an entry between test and enforce mode. Returns false when the
    /// id is unknown.
    pub fn set_test_mode(&self, id: i64, test_mode: bool) -> SyncResult<bool> {
        let mut state = self.state()?;
        let ts = state.tick();
        match state.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.test_mode = test_mode;
                entry.updated_at = Some(ts);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(&self, id: i64) -> SyncResult<bool> {
        let mut state = self.state()?;
        let before = state.entries.len();
        state.entries.retain(|e| e.id != id);
        Ok(state.entries.len() != before)
    }

    pub fn fail_next(&self, n: u32) -> SyncResult<()> {
        self.state()?.failures_remaining = n;
        Ok(())
    }

    /// Number of store calls served or refused so far.
    pub fn calls(&self) -> u64 {
        self.state().map(|s| s.calls).unwrap_or(0)
    }

    fn checked(&self) -> SyncResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.state()?;
        state.calls += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(SyncError::store("injected outage"));
        }
        Ok(state)
    }
}

impl MemoryState {
    fn tick(&mut self) -> NaiveDateTime {
        self.clock += Duration::seconds(1);
        self.clock
    }
}

impl Default for MemoryEntryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EntryStore for MemoryEntryStore {
    async fn connect(&self) -> SyncResult<()> {
        self.checked().map(|_| ())
    }

    async fn fetch_entries(&self) -> SyncResult<Vec<BlockEntry>> {
        let state = self.checked()?;
        let mut entries = state.entries.clone();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    async fn fetch_fingerprint(&self) -> SyncResult<Fingerprint> {
        let state = self.checked()?;
        let max = state.entries.iter().filter_map(|e| e.updated_at).max();
        Ok(Fingerprint::new(
            state.entries.len() as u64,
            max.map(|ts| ts.to_string()),
        ))
    }
}
