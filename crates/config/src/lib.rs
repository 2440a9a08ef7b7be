use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

mod schema;

pub use schema::{
    AccessControlConfig, AccessControlMode, CURRENT_CONFIG_VERSION, Config, DatabaseConfig,
    ServerConfig,
};

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const ASSET_DIR_ENV: &str = "TEAMTRACK_ASSET_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("No home directory available for application data")]
    NoDataDir,
}

/// Will always return config, falling back to defaults on missing/invalid files.
pub async fn load_config_from_file(config_path: &Path) -> Config {
    match std::fs::read_to_string(config_path) {
        Ok(raw_config) => Config::from_raw(&raw_config),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                tracing::info!("No config file found at {}, using defaults", config_path.display());
            } else {
                tracing::warn!("Failed to read config file: {}", err);
            }
            Config::default()
        }
    }
}

/// Directory holding the config file and the default SQLite database.
pub fn asset_dir() -> Result<PathBuf, ConfigError> {
    let path = match std::env::var(ASSET_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ if cfg!(debug_assertions) => PathBuf::from(PROJECT_ROOT).join("../../dev_assets"),
        _ => ProjectDirs::from("dev", "teamtrack", "teamtrack")
            .ok_or(ConfigError::NoDataDir)?
            .data_dir()
            .to_path_buf(),
    };

    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }
    Ok(path)
}

pub fn config_path(asset_dir: &Path) -> PathBuf {
    asset_dir.join("config.json")
}
