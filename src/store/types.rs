use chrono::NaiveDateTime;
use std::fmt;

/// One blocklist row as stored in `blocked_addresses`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub id: i64,
    pub pattern: String,
    pub is_regex: bool,
    pub test_mode: bool,
    pub updated_at: Option<NaiveDateTime>,
}

impl BlockEntry {
    /// New entries start in test mode so an operator can watch the logs
    /// before anything is actually rejected.
    pub fn new(id: i64, pattern: impl Into<String>, is_regex: bool) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            is_regex,
            test_mode: true,
            updated_at: None,
        }
    }

    pub fn enforced(mut self) -> Self {
        self.test_mode = false;
        self
    }
}

/// Cheap change marker: `(COUNT(*), MAX(updated_at))`.
///
/// `max_updated_at` is kept as the store rendered it (text, epoch integer,
/// whatever the writer used) and only ever compared for equality. Equal fingerprints are taken to mean "nothing changed". An insert and a
/// delete landing in the same second can cancel out, and a writer that moves
/// `updated_at` backwards can hide an edit; both go unnoticed until the next
/// real change or a restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub row_count: u64,
    pub max_updated_at: Option<String>,
}

impl Fingerprint {
    pub fn new(row_count: u64, max_updated_at: Option<String>) -> Self {
        Self {
            row_count,
            max_updated_at,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_updated_at {
            Some(ref ts) => write!(f, "({}, {})", self.row_count, ts),
            None => write!(f, "({}, -)", self.row_count),
        }
    }
}
