mod backoff;
mod memory;
mod sqlite;
mod traits;
mod types;

pub use backoff::{retry_until_ready, Backoff};
pub use memory::MemoryEntryStore;
pub use sqlite::SqliteEntryStore;
pub use traits::EntryStore;
pub use types::{BlockEntry, Fingerprint};
