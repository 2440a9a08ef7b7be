use std::{
    path::Path,
    sync::{Mutex, MutexGuard, OnceLock},
};

use config::Config;
use db::DBService;
use tempfile::TempDir;

use crate::{DeploymentImpl, deployment::LocalDeployment};

pub fn test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

const ASSET_DIR_ENV: &str = "TEAMTRACK_ASSET_DIR";
const DATABASE_URL_ENV: &str = "DATABASE_URL";

pub struct TestEnvGuard {
    _lock: MutexGuard<'static, ()>,
    prev_database_url: Option<String>,
    prev_asset_dir: Option<String>,
}

impl TestEnvGuard {
    pub fn new(temp_root: &Path, db_url: String) -> Self {
        let lock = test_lock().lock().unwrap_or_else(|err| err.into_inner());
        let prev_database_url = std::env::var(DATABASE_URL_ENV).ok();
        let prev_asset_dir = std::env::var(ASSET_DIR_ENV).ok();

        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            std::env::set_var(ASSET_DIR_ENV, temp_root);
            std::env::set_var(DATABASE_URL_ENV, db_url);
        }

        Self {
            _lock: lock,
            prev_database_url,
            prev_asset_dir,
        }
    }
}

impl Drop for TestEnvGuard {
    fn drop(&mut self) {
        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            match &self.prev_database_url {
                Some(value) => std::env::set_var(DATABASE_URL_ENV, value),
                None => std::env::remove_var(DATABASE_URL_ENV),
            }
            match &self.prev_asset_dir {
                Some(value) => std::env::set_var(ASSET_DIR_ENV, value),
                None => std::env::remove_var(ASSET_DIR_ENV),
            }
        }
    }
}

/// A deployment over a fresh SQLite file that lives as long as the returned directory.
pub async fn test_deployment(config: Config) -> (TempDir, DeploymentImpl) {
    let temp_root = tempfile::tempdir().unwrap();
    let db_path = temp_root.path().join("db.sqlite");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
    let db = DBService::new(&db_url, 2).await.unwrap();
    (temp_root, LocalDeployment::from_parts(config, db))
}
