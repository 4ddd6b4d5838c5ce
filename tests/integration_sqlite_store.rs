use postfix_blocker::error::SyncError;
use postfix_blocker::store::{EntryStore, SqliteEntryStore};
use rusqlite::{params, Connection};

fn create_schema(conn: &Connection) {
    conn.execute(
        "CREATE TABLE blocked_addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL UNIQUE,
            is_regex INTEGER NOT NULL DEFAULT 0,
            test_mode INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .unwrap();
}

fn insert(conn: &Connection, pattern: &str, is_regex: bool, test_mode: bool, ts: &str) {
    conn.execute(
        "INSERT INTO blocked_addresses (pattern, is_regex, test_mode, updated_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![pattern, is_regex, test_mode, ts],
    )
    .unwrap();
}

#[tokio::test]
async fn test_store_becomes_ready_once_table_exists() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("blocker.db");
    let store = SqliteEntryStore::new(&db_path);

    // No database yet.
    assert!(matches!(
        store.connect().await,
        Err(SyncError::StoreUnavailable(_))
    ));

    // Database without the table.
    let writer = Connection::open(&db_path).unwrap();
    assert!(store.connect().await.is_err());

    create_schema(&writer);
    store.connect().await.unwrap();
    let fp = store.fetch_fingerprint().await.unwrap();
    assert_eq!(fp.row_count, 0);
    assert_eq!(fp.max_updated_at, None);
}

#[tokio::test]
async fn test_fetch_entries_and_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("blocker.db");
    let writer = Connection::open(&db_path).unwrap();
    create_schema(&writer);
    insert(&writer, "a@x.com", false, false, "2024-05-01 10:00:00");
    insert(&writer, "b.*@x.com", true, true, "2024-05-01 10:00:05");

    let store = SqliteEntryStore::from_url(&format!("sqlite://{}", db_path.display())).unwrap();
    store.connect().await.unwrap();

    let entries = store.fetch_entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].pattern, "a@x.com");
    assert!(!entries[0].is_regex);
    assert!(!entries[0].test_mode);
    assert_eq!(entries[1].pattern, "b.*@x.com");
    assert!(entries[1].is_regex);
    assert!(entries[1].test_mode);
    assert!(entries[0].id < entries[1].id);

    let before = store.fetch_fingerprint().await.unwrap();
    assert_eq!(before.row_count, 2);
    assert_eq!(before.max_updated_at.as_deref(), Some("2024-05-01 10:00:05"));
    assert_eq!(store.fetch_fingerprint().await.unwrap(), before);

    // Toggling a mode bumps updated_at.
    writer
        .execute(
            "UPDATE blocked_addresses SET test_mode = 0, updated_at = ?1 WHERE pattern = ?2",
            params!["2024-05-01 10:01:00", "b.*@x.com"],
        )
        .unwrap();
    let after_update = store.fetch_fingerprint().await.unwrap();
    assert_ne!(after_update, before);

    // Deleting changes the count.
    writer
        .execute("DELETE FROM blocked_addresses WHERE pattern = 'a@x.com'", [])
        .unwrap();
    let after_delete = store.fetch_fingerprint().await.unwrap();
    assert_eq!(after_delete.row_count, 1);
    assert_ne!(after_delete, after_update);
}

#[tokio::test]
async fn test_epoch_and_offset_timestamps_are_readable() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("blocker.db");
    let writer = Connection::open(&db_path).unwrap();
    writer
        .execute(
            "CREATE TABLE blocked_addresses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL UNIQUE,
                is_regex INTEGER NOT NULL DEFAULT 0,
                test_mode INTEGER NOT NULL DEFAULT 1,
                updated_at TIMESTAMP
            )",
            [],
        )
        .unwrap();
    writer
        .execute(
            "INSERT INTO blocked_addresses (pattern, is_regex, test_mode, updated_at)
             VALUES ('a@x.com', 0, 0, ?1)",
            params![1_700_000_000_i64],
        )
        .unwrap();

    let store = SqliteEntryStore::new(&db_path);
    store.connect().await.unwrap();

    let epoch = store.fetch_fingerprint().await.unwrap();
    assert_eq!(epoch.row_count, 1);
    assert_eq!(epoch.max_updated_at.as_deref(), Some("1700000000"));
    let entries = store.fetch_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].updated_at.is_some());

    // RFC 3339 text with a zone designator, and a value nothing can parse.
    insert(&writer, "b@x.com", false, true, "2024-05-01T10:00:00Z");
    insert(&writer, "c@x.com", false, true, "not a timestamp");

    let mixed = store.fetch_fingerprint().await.unwrap();
    assert_eq!(mixed.row_count, 3);
    assert_ne!(mixed, epoch);
    let entries = store.fetch_entries().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[1].updated_at.is_some());
    assert_eq!(entries[2].updated_at, None);
}

#[tokio::test]
async fn test_recovers_after_table_drop() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("blocker.db");
    let writer = Connection::open(&db_path).unwrap();
    create_schema(&writer);

    let store = SqliteEntryStore::new(&db_path);
    store.connect().await.unwrap();

    writer.execute("DROP TABLE blocked_addresses", []).unwrap();
    assert!(matches!(
        store.fetch_entries().await,
        Err(SyncError::StoreUnavailable(_))
    ));

    create_schema(&writer);
    insert(&writer, "c@x.com", false, true, "2024-05-02 00:00:00");
    let entries = store.fetch_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
}
