//! GourdWatch configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GourdWatchError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GourdWatchConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl GourdWatchConfig {
    /// Load config from `path`, or the defaults if no file exists there.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GourdWatchError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GourdWatchError::Config(format!("Failed to parse config: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| GourdWatchError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            return Err(GourdWatchError::Config(
                "scheduler.interval_secs must be greater than 0".into(),
            ));
        }
        if self.push.timeout_secs == 0 {
            return Err(GourdWatchError::Config(
                "push.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the GourdWatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gourdwatch")
    }
}

/// Periodic sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Seconds between ticks. Correctness only needs one tick per calendar day.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Fire the first tick immediately instead of after one interval.
    #[serde(default = "bool_true")]
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            run_on_start: true,
        }
    }
}

/// Push gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    /// Optional bearer token for the push service.
    #[serde(default)]
    pub access_token: String,
    /// Upper bound on a single dispatch call.
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: default_push_endpoint(),
            access_token: String::new(),
            timeout_secs: default_push_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn bool_true() -> bool { true }
fn default_interval_secs() -> u64 { 120 }
fn default_push_endpoint() -> String { "https://exp.host/--/api/v2/push/send".into() }
fn default_push_timeout() -> u64 { 10 }
fn default_db_path() -> String { "~/.gourdwatch/gourdwatch.db".into() }
fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 3000 }
