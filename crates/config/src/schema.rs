use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

pub const CURRENT_CONFIG_VERSION: &str = "v1";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const BACKEND_PORT_ENV: &str = "BACKEND_PORT";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const LOG_LEVEL_ENV: &str = "RUST_LOG";
pub const ACCESS_CONTROL_ENV: &str = "TEAMTRACK_ACCESS_CONTROL";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Falls back to `db.sqlite` inside the asset directory.
    pub url: Option<String>,
    #[serde(alias = "maxConnections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Whether the server checks team permissions on task and member writes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[ts(repr(enum))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AccessControlMode {
    #[default]
    Disabled,
    Enforce,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct AccessControlConfig {
    pub mode: AccessControlMode,
}

impl AccessControlConfig {
    pub fn enforced(&self) -> bool {
        self.mode == AccessControlMode::Enforce
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "configVersion")]
    pub config_version: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(alias = "accessControl")]
    pub access_control: AccessControlConfig,
    /// An `EnvFilter` directive such as `info` or `server=debug`.
    #[serde(alias = "logLevel")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CURRENT_CONFIG_VERSION.to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            access_control: AccessControlConfig::default(),
            log_level: None,
        }
    }
}

impl Config {
    pub fn from_raw(raw_config: &str) -> Self {
        match serde_json::from_str::<Config>(raw_config) {
            Ok(config) => config.normalized(),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config (line {}, column {}): {}, using default",
                    e.line(),
                    e.column(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        self.config_version = CURRENT_CONFIG_VERSION.to_string();

        if self.server.host.trim().is_empty() {
            self.server.host = default_host();
        }
        if self.server.port == 0 {
            tracing::warn!("Port 0 is not allowed, resetting to {}", default_port());
            self.server.port = default_port();
        }
        if self.database.max_connections == 0 {
            self.database.max_connections = default_max_connections();
        }
        if matches!(self.database.url.as_deref(), Some(url) if url.trim().is_empty()) {
            self.database.url = None;
        }
        if matches!(self.log_level.as_deref(), Some(level) if level.trim().is_empty()) {
            self.log_level = None;
        }

        self
    }

    /// Applies overrides read through `lookup`, which returns `None` for unset variables.
    pub fn apply_env_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(host) = lookup(HOST_ENV) {
            self.server.host = host;
        }
        if let Some(raw) = lookup(PORT_ENV).or_else(|| lookup(BACKEND_PORT_ENV)) {
            match raw.parse::<u16>() {
                Ok(port) if port != 0 => self.server.port = port,
                _ => tracing::warn!("Ignoring invalid port '{}'", raw),
            }
        }
        if let Some(url) = lookup(DATABASE_URL_ENV) {
            self.database.url = Some(url);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            self.log_level = Some(level);
        }
        if let Some(raw) = lookup(ACCESS_CONTROL_ENV) {
            match AccessControlMode::from_str(&raw) {
                Ok(mode) => self.access_control.mode = mode,
                Err(_) => tracing::warn!("Ignoring unknown access control mode '{}'", raw),
            }
        }

        self
    }

    pub fn apply_env_overrides(self) -> Self {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn database_url(&self, asset_dir: &Path) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite://{}?mode=rwc",
                asset_dir.join("db.sqlite").to_string_lossy()
            ),
        }
    }
}
