//! tradesync core library: domain types, persisted stores, configuration.
//!
//! - [`types`]: newtypes, enums and records shared by every crate
//! - [`mappings`]: [`MappingStore`], the durable entity mapping store
//! - [`run_log`]: [`RunLog`], the append-only record of sync attempts
//! - [`config`]: [`TradesyncConfig`] loaded from `config.yaml`
//! - [`error`]: [`StoreError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod mappings;
pub mod paths;
mod persist;
pub mod run_log;
pub mod types;

pub use config::{RetryPolicy, SyncConfig, TradesyncConfig};
pub use error::{ConfigError, StoreError};
pub use mappings::{MappingFilter, MappingStore};
pub use run_log::RunLog;
pub use types::{
    EntityMapping, Fingerprint, JobId, JobScope, JobState, LocalId, LogId, MappingStatus,
    RemoteSku, RunLogEntry, RunStatus, Snapshot, SyncField, SyncJob, SyncType,
};
