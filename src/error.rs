use std::path::PathBuf;
use thiserror::Error;

/// Failures the synchronization engine knows how to recover from.
///
/// None of these stop the process; the loop logs them and keeps serving
/// whatever map files are already on disk.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to write map {path}: {source}")]
    Compile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    ExternalCommand {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        SyncError::StoreUnavailable(err.to_string())
    }

    pub fn compile(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Compile {
            path: path.into(),
            source,
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::store(err)
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
