//! Initialization helpers for the application startup.

use crate::config::Config;
use crate::error::SyncResult;
use crate::store::{EntryStore, SqliteEntryStore};
use std::sync::Arc;
use tracing::info;

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Picks the store backend from the configured URL.
pub fn init_store(config: &Config) -> SyncResult<Arc<dyn EntryStore>> {
    let store = SqliteEntryStore::from_url(&config.db_url)?;
    info!("Using SQLite store at {}", store.db_path().display());
    Ok(Arc::new(store))
}
