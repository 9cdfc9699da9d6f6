//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// App Services application id (compile-time override via `CACTUS_APP_ID`).
pub const DEFAULT_APP_ID: &str = match option_env!("CACTUS_APP_ID") {
    Some(id) => id,
    None => "cactus-main-sikxw",
};

/// App Services base URL (compile-time override via `CACTUS_BASE_URL`).
pub const DEFAULT_BASE_URL: &str = match option_env!("CACTUS_BASE_URL") {
    Some(url) => url,
    None => "https://services.cloud.mongodb.com",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_STORE_OPEN_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_LOGOUT_CLEANUP_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NETWORK_PROBE_INTERVAL_MS: u64 = 5_000;
const DEFAULT_NETWORK_PROBE_TIMEOUT_MS: u64 = 1_500;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// App Services application id.
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// App Services base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// How long the synced store may take to open before it reports a timeout.
    #[serde(default = "default_store_open_timeout_ms")]
    pub store_open_timeout_ms: u64,
    /// Upper bound on subscription cleanup during logout.
    #[serde(default = "default_logout_cleanup_timeout_ms")]
    pub logout_cleanup_timeout_ms: u64,
    /// Interval between network reachability probes.
    #[serde(default = "default_network_probe_interval_ms")]
    pub network_probe_interval_ms: u64,
    /// Connect timeout of a single reachability probe.
    #[serde(default = "default_network_probe_timeout_ms")]
    pub network_probe_timeout_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_store_open_timeout_ms() -> u64 {
    DEFAULT_STORE_OPEN_TIMEOUT_MS
}

fn default_logout_cleanup_timeout_ms() -> u64 {
    DEFAULT_LOGOUT_CLEANUP_TIMEOUT_MS
}

fn default_network_probe_interval_ms() -> u64 {
    DEFAULT_NETWORK_PROBE_INTERVAL_MS
}

fn default_network_probe_timeout_ms() -> u64 {
    DEFAULT_NETWORK_PROBE_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            app_id: default_app_id(),
            base_url: default_base_url(),
            store_open_timeout_ms: DEFAULT_STORE_OPEN_TIMEOUT_MS,
            logout_cleanup_timeout_ms: DEFAULT_LOGOUT_CLEANUP_TIMEOUT_MS,
            network_probe_interval_ms: DEFAULT_NETWORK_PROBE_INTERVAL_MS,
            network_probe_timeout_ms: DEFAULT_NETWORK_PROBE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Defaults, then environment overrides.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load `config.json` under `paths` if present, then apply environment
    /// overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `config.json` under `paths`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// `CACTUS_LOG_LEVEL` and `CACTUS_BASE_URL` win over file values.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("CACTUS_LOG_LEVEL") {
            if !log_level.trim().is_empty() {
                self.log_level = log_level;
            }
        }
        if let Ok(base_url) = std::env::var("CACTUS_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.base_url = base_url.trim().to_string();
            }
        }
    }

    /// Reject values the session core cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.app_id.trim().is_empty() {
            return Err(CoreError::Config("app_id must not be empty".to_string()));
        }
        self.base_url()?;
        if self.store_open_timeout_ms == 0 {
            return Err(CoreError::Config(
                "store_open_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed base URL.
    pub fn base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.base_url).map_err(CoreError::from)
    }

    pub fn store_open_timeout(&self) -> Duration {
        Duration::from_millis(self.store_open_timeout_ms)
    }

    pub fn logout_cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.logout_cleanup_timeout_ms)
    }

    pub fn network_probe_interval(&self) -> Duration {
        Duration::from_millis(self.network_probe_interval_ms)
    }

    pub fn network_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.network_probe_timeout_ms)
    }
}
