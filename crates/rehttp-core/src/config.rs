use crate::dispatch::Method;
use crate::error::TransportErrorKind;
use crate::retry::{
    RetryConfiguration, DEFAULT_RETRYABLE_ERROR_CODES, DEFAULT_RETRYABLE_METHODS,
    DEFAULT_RETRYABLE_STATUS_CODES,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay in milliseconds.
    pub min_timeout_ms: u64,
    /// Backoff cap in milliseconds; also caps `Retry-After`.
    pub max_timeout_ms: u64,
    pub timeout_factor: f64,
    pub methods: Vec<Method>,
    pub status_codes: Vec<u16>,
    /// Transport failure kinds worth retrying, e.g. "connection-reset".
    pub error_codes: Vec<TransportErrorKind>,
    /// Honour server `Retry-After` hints.
    pub retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let defaults = RetryConfiguration::default();
        Self {
            max_retries: defaults.max_retries,
            min_timeout_ms: defaults.min_timeout.as_millis() as u64,
            max_timeout_ms: defaults.max_timeout.as_millis() as u64,
            timeout_factor: defaults.timeout_factor,
            methods: DEFAULT_RETRYABLE_METHODS.to_vec(),
            status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            error_codes: DEFAULT_RETRYABLE_ERROR_CODES.to_vec(),
            retry_after: defaults.use_retry_after_header,
        }
    }
}

impl RetryConfig {
    /// Runtime settings with the built-in policy.
    pub fn to_configuration(&self) -> RetryConfiguration {
        RetryConfiguration {
            max_retries: self.max_retries,
            min_timeout: Duration::from_millis(self.min_timeout_ms),
            max_timeout: Duration::from_millis(self.max_timeout_ms),
            timeout_factor: self.timeout_factor,
            retryable_methods: self.methods.clone(),
            retryable_status_codes: self.status_codes.clone(),
            retryable_error_codes: self.error_codes.clone(),
            use_retry_after_header: self.retry_after,
            ..RetryConfiguration::default()
        }
    }
}

/// Global configuration loaded from `~/.config/rehttp/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds allowed for establishing a connection.
    pub connect_timeout_secs: u64,
    /// An attempt slower than this many bytes per second ...
    pub low_speed_limit_bytes: u32,
    /// ... for this many seconds is failed with a timeout.
    pub low_speed_time_secs: u64,
    pub user_agent: String,
    /// Optional retry policy; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1,
            low_speed_time_secs: 60,
            user_agent: concat!("rehttp/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: None,
        }
    }
}

impl ClientConfig {
    pub fn retry_configuration(&self) -> RetryConfiguration {
        self.retry
            .as_ref()
            .map(RetryConfig::to_configuration)
            .unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rehttp")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ClientConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        let default_cfg = ClientConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: ClientConfig = toml::from_str(&data)?;
    Ok(cfg)
}
