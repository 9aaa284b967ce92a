//! On-disk layout under the tradesync home.
//!
//! ```text
//! ~/.tradesync/
//!   config.yaml      (optional; defaults apply when absent)
//!   mappings.json    (entity mapping store)
//!   runlog.json      (run log)
//! ```
//!
//! Every helper takes an explicit `home` so tests can root it in a `TempDir`.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "config.yaml";
pub const MAPPINGS_FILE: &str = "mappings.json";
pub const RUN_LOG_FILE: &str = "runlog.json";

pub fn tradesync_root(home: &Path) -> PathBuf {
    home.join(".tradesync")
}

pub fn config_path(home: &Path) -> PathBuf {
    tradesync_root(home).join(CONFIG_FILE)
}

pub fn mappings_path(home: &Path) -> PathBuf {
    tradesync_root(home).join(MAPPINGS_FILE)
}

pub fn run_log_path(home: &Path) -> PathBuf {
    tradesync_root(home).join(RUN_LOG_FILE)
}

/// The user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
