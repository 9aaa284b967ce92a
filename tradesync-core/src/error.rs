//! Error types for tradesync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{LocalId, LogId};

/// All errors that can arise from the persisted stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A store document on disk could not be parsed.
    #[error("failed to parse store at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (save path).
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no mapping for local id '{0}'")]
    MappingNotFound(LocalId),

    /// The remote SKU of a mapping cannot change while it is being synced.
    #[error("mapping '{0}' is syncing; retry once the running job finishes")]
    MappingBusy(LocalId),

    /// A blocking store task was cancelled before it finished.
    #[error("store task cancelled: {0}")]
    Cancelled(String),

    #[error("no run log entry with id {0}")]
    LogEntryNotFound(LogId),

    /// `complete` was called on an entry that already reached a terminal status.
    #[error("run log entry {0} is already completed")]
    LogAlreadyCompleted(LogId),

    /// A caller passed a record that violates a store invariant.
    #[error("invalid record: {0}")]
    Invalid(String),
}

/// Errors from loading `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with file path and serde_yaml's line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
