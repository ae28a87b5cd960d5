use serde::Deserialize;
use std::{env, fs, path::Path};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP port to listen on.
    pub port: u16,

    /// Log level for tracing (e.g. "info", "debug").
    pub log_level: String,

    pub server_version: String,

    /// Where records live: a Redis server, or process memory.
    pub backend: BackendKind,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub redis_db: i64,

    /// Rolling expiration (seconds) for records and per-user indexes.
    pub record_ttl_seconds: u64,

    /// Hours east of UTC used for the human-readable timestamps.
    pub utc_offset_hours: i32,

    /// Folder for the rolling `server.log` files.
    ///
    /// If `None`, `/log` is used inside a container and `./log` otherwise.
    /// An empty string disables file logging.
    pub log_folder: Option<String>,

    /// How often (seconds) the memory backend sweeps expired keys.
    ///
    /// If `None`, expired keys are only hidden on read and dropped on write.
    pub cleanup_interval: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8890,
            log_level: "info".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            backend: BackendKind::Redis,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: None,
            redis_db: 0,
            record_ttl_seconds: 42 * 24 * 60 * 60,
            utc_offset_hours: -3,
            log_folder: None,
            cleanup_interval: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str::<AppConfig>(&file).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `PORT`, `LOG_LEVEL`, `LOG_FOLDER` and `REDIS_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|v| parse_or_warn("PORT", &v)) {
            self.port = port;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(folder) = lookup("LOG_FOLDER") {
            self.log_folder = Some(folder);
        }
        if let Some(host) = lookup("REDIS_SERVER") {
            self.redis_host = host;
        }
        if let Some(port) = lookup("REDIS_PORT").and_then(|v| parse_or_warn("REDIS_PORT", &v)) {
            self.redis_port = port;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.redis_password = Some(password).filter(|p| !p.is_empty());
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    let parsed = value.parse().ok();
    if parsed.is_none() {
        tracing::warn!("ignoring invalid {name}={value}");
    }
    parsed
}
