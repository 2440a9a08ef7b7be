use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use config::{Config, ConfigError, asset_dir, config_path, load_config_from_file};
use db::{DBService, DbErr};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Everything a request handler can reach: configuration and the store.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Arc<RwLock<Config>>;

    fn db(&self) -> &DBService;
}

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<RwLock<Config>>,
    db: DBService,
}

impl LocalDeployment {
    pub fn from_parts(config: Config, db: DBService) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            db,
        }
    }

    /// Reads `config.json` from the asset directory and layers the environment on top.
    pub async fn load_runtime_config() -> Result<(PathBuf, Config), DeploymentError> {
        let asset_dir = asset_dir()?;
        let config = load_config_from_file(&config_path(&asset_dir))
            .await
            .apply_env_overrides();
        Ok((asset_dir, config))
    }

    /// Opens (and migrates) the store named by `config` under `asset_dir`.
    pub async fn with_config(asset_dir: &Path, config: Config) -> Result<Self, DeploymentError> {
        let database_url = config.database_url(asset_dir);
        let db = DBService::new(&database_url, config.database.max_connections).await?;
        tracing::info!(
            asset_dir = %asset_dir.display(),
            access_control = %config.access_control.mode,
            "Deployment ready"
        );
        Ok(Self::from_parts(config, db))
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let (asset_dir, config) = Self::load_runtime_config().await?;
        Self::with_config(&asset_dir, config).await
    }

    fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }
}
