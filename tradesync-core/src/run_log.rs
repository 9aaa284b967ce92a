//! Append-only run log of sync attempts.
//!
//! Persisted as `<home>/.tradesync/runlog.json`. Entries are never removed;
//! the single permitted mutation is `Running → Success | Failed` on the same
//! row, so an in-flight entry keeps a stable id. Every write rewrites the
//! whole document.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::paths::run_log_path;
use crate::persist;
use crate::types::{LogId, RunLogEntry, RunStatus, SyncType};

/// Message written on entries found `Running` at boot.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RunLogFile {
    next_id: u64,
    #[serde(default)]
    entries: Vec<RunLogEntry>,
}

#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    state: Mutex<RunLogFile>,
}

impl RunLog {
    pub fn open_at(home: &Path) -> Result<Self, StoreError> {
        Self::open(run_log_path(home))
    }

    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let mut file: RunLogFile = persist::load(&path)?.unwrap_or_default();
        // Guard against a hand-edited document whose counter lags its rows.
        let max_id = file.entries.iter().map(|e| e.id.0).max().unwrap_or(0);
        file.next_id = file.next_id.max(max_id + 1);
        Ok(Self {
            path,
            state: Mutex::new(file),
        })
    }

    /// Append a `Running` entry and return its id.
    pub fn begin(&self, sync_type: SyncType) -> Result<LogId, StoreError> {
        self.mutate(|file| {
            let id = LogId(file.next_id);
            file.next_id += 1;
            file.entries.push(RunLogEntry {
                id,
                timestamp: Utc::now(),
                status: RunStatus::Running,
                sync_type,
                message: "Starting sync...".to_string(),
                finished_at: None,
            });
            Ok(id)
        })
    }

    /// Write the terminal status of a `Running` entry.
    pub fn complete(
        &self,
        id: LogId,
        status: RunStatus,
        message: impl Into<String>,
    ) -> Result<RunLogEntry, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Invalid(format!(
                "cannot complete run log entry {id} with status {status}"
            )));
        }
        let message = message.into();
        self.mutate(|file| {
            let entry = file
                .entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(StoreError::LogEntryNotFound(id))?;
            if entry.status.is_terminal() {
                return Err(StoreError::LogAlreadyCompleted(id));
            }
            entry.status = status;
            entry.message = message;
            entry.finished_at = Some(Utc::now());
            Ok(entry.clone())
        })
    }

    pub fn get(&self, id: LogId) -> Result<RunLogEntry, StoreError> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(StoreError::LogEntryNotFound(id))
    }

    /// Up to `limit` entries, newest first.
    pub fn list(&self, limit: usize) -> Vec<RunLogEntry> {
        // Ids grow monotonically with creation, so reverse insertion order is
        // newest-first even when two entries share a timestamp.
        self.lock()
            .entries
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Start time of the newest successful run.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .entries
            .iter()
            .rev()
            .find(|e| e.status == RunStatus::Success)
            .map(|e| e.timestamp)
    }

    /// Boot-time recovery: fail every entry still `Running`.
    pub fn recover_interrupted(&self) -> Result<Vec<LogId>, StoreError> {
        self.mutate(|file| {
            let now = Utc::now();
            let mut failed = Vec::new();
            for entry in file
                .entries
                .iter_mut()
                .filter(|e| e.status == RunStatus::Running)
            {
                entry.status = RunStatus::Failed;
                entry.message = INTERRUPTED_MESSAGE.to_string();
                entry.finished_at = Some(now);
                failed.push(entry.id);
            }
            Ok(failed)
        })
    }

    /// Apply `f` and persist, rolling memory back if the write fails.
    fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut RunLogFile) -> Result<T, StoreError>,
    {
        let mut state = self.lock();
        let before = state.clone();
        let out = f(&mut *state)?;
        if let Err(err) = persist::save(&self.path, &*state) {
            *state = before;
            return Err(err);
        }
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, RunLogFile> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
