use super::traits::EntryStore;
use super::types::{BlockEntry, Fingerprint};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, NaiveDateTime};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const SELECT_ENTRIES: &str =
    "SELECT id, pattern, is_regex, test_mode, updated_at FROM blocked_addresses ORDER BY id";
const SELECT_FINGERPRINT: &str = "SELECT COUNT(*), MAX(updated_at) FROM blocked_addresses";

/// SQLite-backed store. Opens the database read-only; the schema is owned by
/// whoever writes the table.
pub struct SqliteEntryStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteEntryStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Accepts `sqlite:///abs/path`, `sqlite://rel/path` or a bare path.
    pub fn from_url(url: &str) -> SyncResult<Self> {
        let path = match url.split_once("://") {
            Some(("sqlite", rest)) => rest,
            Some((scheme, _)) => {
                return Err(SyncError::Config(format!(
                    "unsupported store scheme {scheme:?} in {url:?}"
                )))
            }
            None => url,
        };
        if path.is_empty() {
            return Err(SyncError::Config(format!("no database path in {url:?}")));
        }
        Ok(Self::new(path))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(db_path: &Path) -> SyncResult<Connection> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // Probe: fails if the table has not been created yet.
        conn.query_row(SELECT_FINGERPRINT, [], |_| Ok(()))?;
        Ok(conn)
    }

    /// Runs `query` on the blocking pool against the cached connection,
    /// reconnecting first if needed. Any error drops the connection so the
    /// next attempt starts fresh.
    async fn with_conn<T, F>(&self, query: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let slot = self.conn.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| SyncError::store("connection lock poisoned"))?;
            if guard.is_none() {
                *guard = Some(Self::open(&db_path)?);
            }
            let Some(conn) = guard.as_ref() else {
                return Err(SyncError::store("no connection"));
            };
            match query(conn) {
                Ok(value) => Ok(value),
                Err(e) => {
                    *guard = None;
                    Err(SyncError::from(e))
                }
            }
        })
        .await
        .map_err(SyncError::store)?
    }
}

#[async_trait::async_trait]
impl EntryStore for SqliteEntryStore {
    async fn connect(&self) -> SyncResult<()> {
        let slot = self.conn.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let mut guard = slot
                .lock()
                .map_err(|_| SyncError::store("connection lock poisoned"))?;
            *guard = Some(conn);
            Ok::<_, SyncError>(())
        })
        .await
        .map_err(SyncError::store)??;
        info!("Connected to blocklist store at {}", self.db_path.display());
        Ok(())
    }

    async fn fetch_entries(&self) -> SyncResult<Vec<BlockEntry>> {
        let entries = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare_cached(SELECT_ENTRIES)?;
                let rows = stmt.query_map([], |row| {
                    Ok(BlockEntry {
                        id: row.get(0)?,
                        pattern: row.get(1)?,
                        is_regex: row.get(2)?,
                        test_mode: row.get(3)?,
                        updated_at: parse_timestamp(row.get_ref(4)?),
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        debug!("Fetched {} entries from store", entries.len());
        Ok(entries)
    }

    async fn fetch_fingerprint(&self) -> SyncResult<Fingerprint> {
        self.with_conn(|conn| {
            conn.prepare_cached(SELECT_FINGERPRINT)?.query_row([], |row| {
                let count: i64 = row.get(0)?;
                let max_ts = change_marker(row.get_ref(1)?);
                Ok(Fingerprint::new(count.max(0) as u64, max_ts))
            })
        })
        .await
    }
}

/// Renders `MAX(updated_at)` as-is. The value only feeds equality checks,
/// so any storage class the writer picked is accepted.
fn change_marker(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(b.iter().map(|byte| format!("{byte:02x}")).collect()),
    }
}

/// Best-effort decode of a row's `updated_at`. Unknown shapes become `None`;
/// nothing downstream depends on the value.
fn parse_timestamp(value: ValueRef<'_>) -> Option<NaiveDateTime> {
    match value {
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc()),
        ValueRef::Text(t) => {
            let text = std::str::from_utf8(t).ok()?.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Some(dt.naive_utc());
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        let store = SqliteEntryStore::from_url("sqlite:///var/lib/blocker.db").unwrap();
        assert_eq!(store.db_path(), Path::new("/var/lib/blocker.db"));

        let store = SqliteEntryStore::from_url("data/blocker.db").unwrap();
        assert_eq!(store.db_path(), Path::new("data/blocker.db"));

        assert!(matches!(
            SqliteEntryStore::from_url("ibm_db_sa://db2inst1@db2:50000/BLOCKER"),
            Err(SyncError::Config(_))
        ));
        assert!(SqliteEntryStore::from_url("sqlite://").is_err());
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = NaiveDateTime::parse_from_str("2024-05-01 10:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        assert_eq!(
            parse_timestamp(ValueRef::Text(b"2024-05-01 10:00:00")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(ValueRef::Text(b"2024-05-01T10:00:00Z")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(ValueRef::Text(b"2024-05-01T12:00:00+02:00")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(ValueRef::Integer(1_714_557_600)),
            Some(expected)
        );
        assert_eq!(parse_timestamp(ValueRef::Text(b"yesterday")), None);
        assert_eq!(parse_timestamp(ValueRef::Null), None);
    }

    #[test]
    fn test_change_marker_keeps_raw_value() {
        assert_eq!(change_marker(ValueRef::Null), None);
        assert_eq!(
            change_marker(ValueRef::Integer(1_700_000_000)).as_deref(),
            Some("1700000000")
        );
        assert_eq!(
            change_marker(ValueRef::Text(b"2024-05-01T10:00:00Z")).as_deref(),
            Some("2024-05-01T10:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEntryStore::new(dir.path().join("absent.db"));
        assert!(matches!(
            store.connect().await,
            Err(SyncError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.fetch_fingerprint().await,
            Err(SyncError::StoreUnavailable(_))
        ));
    }
}
