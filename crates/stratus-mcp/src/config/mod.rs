//! Configuration loading and resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::origin::{policy_for, OriginPolicy};
use crate::types::{McpError, McpResult};

/// Env var naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "STRATUS_CONFIG";
/// Env var carrying the API key; overrides the file, loses to the CLI.
pub const API_KEY_ENV: &str = "STRATUS_API_KEY";
/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "stratus.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Required value of `X-API-Key`. Unset means no auth.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Accepted `Origin` values. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Per-subscriber queue depth before broadcasts are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
}

fn default_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    crate::session::DEFAULT_QUEUE_CAPACITY
}

fn default_endpoint_path() -> String {
    "/mcp".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            api_key: None,
            allowed_origins: Vec::new(),
            keepalive_secs: default_keepalive_secs(),
            queue_capacity: default_queue_capacity(),
            endpoint_path: default_endpoint_path(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub addr: Option<String>,
    pub api_key: Option<String>,
    pub allowed_origins: Vec<String>,
    pub keepalive_secs: Option<u64>,
    pub queue_capacity: Option<usize>,
}

impl ServerConfig {
    /// Load a TOML config file.
    pub fn load(path: &Path) -> McpResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| McpError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the resolved path if there is one, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> McpResult<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply env then CLI overrides, CLI winning.
    pub fn apply(mut self, overrides: Overrides) -> McpResult<Self> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Some(addr) = overrides.addr {
            self.addr = addr;
        }
        if let Some(key) = overrides.api_key {
            self.api_key = Some(key);
        }
        if !overrides.allowed_origins.is_empty() {
            self.allowed_origins = overrides.allowed_origins;
        }
        if let Some(secs) = overrides.keepalive_secs {
            self.keepalive_secs = secs;
        }
        if let Some(capacity) = overrides.queue_capacity {
            self.queue_capacity = capacity;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.keepalive_secs == 0 {
            return Err(McpError::Config("keepalive_secs must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(McpError::Config("queue_capacity must be positive".into()));
        }
        if !self.endpoint_path.starts_with('/') || self.endpoint_path == "/sse" {
            return Err(McpError::Config(format!(
                "invalid endpoint_path: {}",
                self.endpoint_path
            )));
        }
        Ok(())
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn origin_policy(&self) -> Box<dyn OriginPolicy> {
        policy_for(&self.allowed_origins)
    }
}

/// Resolve the config file path: explicit flag, then `STRATUS_CONFIG`, then
/// `./stratus.toml` if it exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    cwd_config.exists().then_some(cwd_config)
}
