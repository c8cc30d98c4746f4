pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Environment variable overriding `upstream.cookie`.
pub const COOKIE_ENV_VAR: &str = "GROK_COOKIE";
/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV_VAR: &str = "GROK_RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Which token estimation strategy to start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenCounterMode {
    #[default]
    Bpe,
    Heuristic,
}

impl fmt::Display for TokenCounterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenCounterMode::Bpe => write!(f, "bpe"),
            TokenCounterMode::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_idle_timeout_secs() -> u64 {
    60
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            http_use_env_proxy: false,
            runtime_worker_threads: None,
            runtime_max_blocking_threads: None,
        }
    }
}

/// Backend connection settings and the browser fingerprint it expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Fallback cookie used when a request does not carry its own.
    #[serde(default)]
    pub cookie: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Defaults to `base_url` when empty.
    #[serde(default)]
    pub origin: String,
    /// Defaults to `base_url` plus a trailing slash when empty.
    #[serde(default)]
    pub referer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statsig_id: Option<String>,
}

fn default_base_url() -> String {
    "https://grok.ylsagi.com".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:145.0) Gecko/20100101 Firefox/145.0"
        .to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            cookie: String::new(),
            user_agent: default_user_agent(),
            origin: String::new(),
            referer: String::new(),
            statsig_id: None,
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn effective_origin(&self) -> String {
        if self.origin.is_empty() {
            self.trimmed_base_url().to_string()
        } else {
            self.origin.clone()
        }
    }

    #[must_use]
    pub fn effective_referer(&self) -> String {
        if self.referer.is_empty() {
            format!("{}/", self.trimmed_base_url())
        } else {
            self.referer.clone()
        }
    }

    /// Fallback cookie, or `None` when none is configured.
    #[must_use]
    pub fn fallback_cookie(&self) -> Option<&str> {
        let cookie = self.cookie.trim();
        (!cookie.is_empty()).then_some(cookie)
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default)]
    pub token_counter: TokenCounterMode,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_model() -> String {
    "grok-3".to_string()
}
fn default_models() -> Vec<String> {
    vec!["grok-3".to_string(), "grok-2".to_string(), "grok-1".to_string()]
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_model: default_model(),
            models: default_models(),
            token_counter: TokenCounterMode::default(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
///
/// A missing file yields the defaults; an unreadable or malformed one is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "config file not found, using defaults");
            AppConfig::default()
        }
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, std::env::var(COOKIE_ENV_VAR).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Parse YAML into an [`AppConfig`]; an empty document yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when the document is malformed.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

fn apply_env_overrides(config: &mut AppConfig, cookie: Option<String>) {
    if let Some(cookie) = cookie.filter(|c| !c.trim().is_empty()) {
        config.upstream.cookie = cookie;
    }
}
