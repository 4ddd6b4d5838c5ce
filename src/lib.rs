//! Keeps Postfix recipient access maps in sync with a blocklist table.
//!
//! The engine polls a cheap `(count, max(updated_at))` fingerprint of the
//! table, and when it changes rewrites the four map files, runs `postmap`
//! and reloads Postfix. A SIGUSR1 cuts the polling wait short.

pub mod config;
pub mod engine;
pub mod error;
pub mod init;
pub mod maps;
pub mod postfix;
pub mod stats;
pub mod store;
