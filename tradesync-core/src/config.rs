//! Daemon configuration loaded from `<home>/.tradesync/config.yaml`.
//!
//! Every section has defaults, so a missing file (or a partial one) is a
//! valid configuration. The loaded struct is passed explicitly to the queue,
//! executor and server at startup; nothing reads configuration globally.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::config_path;

/// Backoff policy for transient collaborator failures.
///
/// Attempt `n` (1-based) that fails transiently is followed by a delay of
/// `base_delay_ms * factor^(n-1)`, scaled by a random factor in
/// `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            factor: 2,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after failed attempt `attempt` (1-based).
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let scale = u64::from(self.factor).saturating_pow(exp);
        Duration::from_millis(self.base_delay_ms.saturating_mul(scale))
    }

    /// Delay after failed attempt `attempt`, with `unit` in `[-1, 1]`
    /// selecting where inside the jitter band the delay lands.
    pub fn delay_with_jitter(&self, attempt: u32, unit: f64) -> Duration {
        let nominal_ms = self.nominal_delay(attempt).as_millis() as f64;
        let spread = 1.0 + self.jitter * unit.clamp(-1.0, 1.0);
        Duration::from_millis((nominal_ms * spread).max(0.0).round() as u64)
    }
}

/// Orchestration options consumed by the queue, worker pool and executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub worker_pool_size: usize,
    pub per_call_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub dedup_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            per_call_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            dedup_enabled: true,
        }
    }
}

impl SyncConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Origins allowed by CORS (the dashboard's dev server by default).
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// Odoo JSON-RPC connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdooConfig {
    pub url: String,
    pub db_name: String,
    pub username: String,
    pub api_key: String,
}

/// Marketplace listing API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TradesyncConfig {
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub odoo: Option<OdooConfig>,
    pub marketplace: Option<MarketplaceConfig>,
    pub log_format: LogFormat,
}

impl TradesyncConfig {
    /// Load `<home>/.tradesync/config.yaml`, falling back to defaults when the
    /// file is absent.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    /// `load_at` convenience wrapper rooted at the user's home directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&crate::paths::home()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sync = &self.sync;
        if sync.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "sync.worker_pool_size must be at least 1".to_string(),
            ));
        }
        if sync.per_call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.per_call_timeout_ms must be positive".to_string(),
            ));
        }
        if sync.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "sync.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if sync.retry.factor == 0 {
            return Err(ConfigError::Invalid(
                "sync.retry.factor must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&sync.retry.jitter) {
            return Err(ConfigError::Invalid(
                "sync.retry.jitter must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_config(home: &Path, yaml: &str) {
        let path = config_path(home);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, yaml).unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let config = TradesyncConfig::load_at(home.path()).unwrap();
        assert_eq!(config.sync.worker_pool_size, 4);
        assert_eq!(config.sync.per_call_timeout(), Duration::from_secs(30));
        assert!(config.sync.dedup_enabled);
        assert_eq!(config.sync.retry, RetryPolicy::default());
        assert!(config.odoo.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            "sync:\n  worker_pool_size: 2\n  retry:\n    max_attempts: 5\nlog_format: json\n",
        );
        let config = TradesyncConfig::load_at(home.path()).unwrap();
        assert_eq!(config.sync.worker_pool_size, 2);
        assert_eq!(config.sync.retry.max_attempts, 5);
        assert_eq!(config.sync.retry.base_delay_ms, 500);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn odoo_section_parses() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            "odoo:\n  url: https://erp.example.com\n  db_name: prod\n  username: bot\n  api_key: k\n",
        );
        let config = TradesyncConfig::load_at(home.path()).unwrap();
        let odoo = config.odoo.expect("odoo section");
        assert_eq!(odoo.db_name, "prod");
    }

    #[rstest]
    #[case("sync:\n  worker_pool_size: 0\n", "worker_pool_size")]
    #[case("sync:\n  retry:\n    max_attempts: 0\n", "max_attempts")]
    #[case("sync:\n  retry:\n    jitter: 1.5\n", "jitter")]
    #[case("sync:\n  per_call_timeout_ms: 0\n", "per_call_timeout_ms")]
    fn invalid_values_are_rejected(#[case] yaml: &str, #[case] field: &str) {
        let home = TempDir::new().unwrap();
        write_config(home.path(), yaml);
        let err = TradesyncConfig::load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
        assert!(err.to_string().contains(field), "got: {err}");
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "sync: [unclosed");
        let err = TradesyncConfig::load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn nominal_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.nominal_delay(1), Duration::from_millis(500));
        assert_eq!(policy.nominal_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.nominal_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn jitter_stays_within_band() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_with_jitter(1, 1.0), Duration::from_millis(600));
        assert_eq!(policy.delay_with_jitter(1, -1.0), Duration::from_millis(400));
        assert_eq!(policy.delay_with_jitter(2, 0.0), Duration::from_millis(1000));
        // Out-of-range units are clamped.
        assert_eq!(policy.delay_with_jitter(1, 7.0), Duration::from_millis(600));
    }
}
