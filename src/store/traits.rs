use super::types::{BlockEntry, Fingerprint};
use crate::error::SyncResult;

/// Read-only view of the blocklist table.
///
/// Every method fails with `SyncError::StoreUnavailable` when the backing
/// store cannot be reached; callers retry instead of giving up.
#[async_trait::async_trait]
pub trait EntryStore: Send + Sync {
    /// Establishes (or re-establishes) the connection and checks that the
    /// blocklist table is readable.
    async fn connect(&self) -> SyncResult<()>;

    /// All entries, ordered by id, from a single consistent read.
    async fn fetch_entries(&self) -> SyncResult<Vec<BlockEntry>>;

    async fn fetch_fingerprint(&self) -> SyncResult<Fingerprint>;
}
