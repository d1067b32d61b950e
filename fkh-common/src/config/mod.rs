//! Configuration system for FKH.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `FKH_*` environment variables. The merged result is validated once
//! at startup.

pub mod env;

pub use env::{EnvError, EnvParser};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid environment overrides: {}", format_env_errors(.0))]
    Env(Vec<EnvError>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn format_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// FKH configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FkhConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Whether scheduled passes run at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expressions (with seconds) at which a full pass starts.
    #[serde(default = "default_cron")]
    pub cron: Vec<String>,
    /// Interval between monitored-count refreshes.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    /// Run one pass right after startup.
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_cron(),
            status_interval_secs: default_status_interval(),
            run_on_start: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Concurrent keep-alive calls within one tenant.
    #[serde(default = "default_leaf_concurrency")]
    pub leaf_concurrency: usize,
    /// Concurrent tenants per pass (0 = unbounded).
    #[serde(default)]
    pub tenant_concurrency: usize,
    /// Timeout for an on-demand single-tenant run.
    #[serde(default = "default_on_demand_timeout")]
    pub on_demand_timeout_secs: u64,
    /// Minimum time between two on-demand runs of the same tenant.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            leaf_concurrency: default_leaf_concurrency(),
            tenant_concurrency: 0,
            on_demand_timeout_secs: default_on_demand_timeout(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl ReconcileConfig {
    pub fn on_demand_timeout(&self) -> Duration {
        Duration::from_secs(self.on_demand_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Permissions the actor needs on every tracked resource.
    #[serde(default = "default_required_permissions")]
    pub required: Vec<String>,
    /// Findings per bucket per report page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            required: default_required_permissions(),
            page_size: default_page_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cron() -> Vec<String> {
    vec!["0 0 0 * * *".to_string(), "0 0 12 * * *".to_string()]
}

fn default_status_interval() -> u64 {
    3600
}

fn default_leaf_concurrency() -> usize {
    8
}

fn default_on_demand_timeout() -> u64 {
    600
}

fn default_cooldown() -> u64 {
    7200
}

fn default_required_permissions() -> Vec<String> {
    [
        "view_channel",
        "read_message_history",
        "send_messages_in_threads",
        "manage_threads",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_page_size() -> usize {
    15
}

/// Default config file location (`$XDG_CONFIG_HOME/fkh/config.toml` on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "fkh").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl FkhConfig {
    /// Load defaults, then the file (if any), then environment overrides.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        let mut parser = EnvParser::new();
        config.apply_env(&mut parser);
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FKH_*` overrides. Errors accumulate in `parser`.
    pub fn apply_env(&mut self, parser: &mut EnvParser) {
        if let Some(level) = parser.get_log_level("LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(json) = parser.get_bool("LOG_JSON") {
            self.general.log_json = json;
        }
        if let Some(enabled) = parser.get_bool("SCHEDULE_ENABLED") {
            self.schedule.enabled = enabled;
        }
        if let Some(cron) = parser.get_string_list("SCHEDULE_CRON") {
            self.schedule.cron = cron;
        }
        if let Some(n) = parser.get_usize_range("LEAF_CONCURRENCY", 1, 256) {
            self.reconcile.leaf_concurrency = n;
        }
        if let Some(n) = parser.get_usize_range("TENANT_CONCURRENCY", 0, 4096) {
            self.reconcile.tenant_concurrency = n;
        }
        if let Some(secs) = parser.get_u64_range("ON_DEMAND_TIMEOUT_SECS", 1, 86_400) {
            self.reconcile.on_demand_timeout_secs = secs;
        }
        if let Some(secs) = parser.get_u64_range("COOLDOWN_SECS", 0, 7 * 86_400) {
            self.reconcile.cooldown_secs = secs;
        }
        if let Some(n) = parser.get_usize_range("PAGE_SIZE", 1, 100) {
            self.permissions.page_size = n;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.leaf_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.leaf_concurrency must be at least 1".to_string(),
            ));
        }
        if self.reconcile.on_demand_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.on_demand_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.permissions.page_size == 0 {
            return Err(ConfigError::Invalid(
                "permissions.page_size must be at least 1".to_string(),
            ));
        }
        if self.schedule.status_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "schedule.status_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.schedule.enabled && self.schedule.cron.is_empty() {
            return Err(ConfigError::Invalid(
                "schedule.cron must list at least one expression when enabled".to_string(),
            ));
        }
        for expr in &self.schedule.cron {
            cron::Schedule::from_str(expr).map_err(|e| {
                ConfigError::Invalid(format!("schedule.cron entry '{expr}' is invalid: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
