use std::{path::Path, time::Duration};

use sea_orm::{ConnectOptions, ConnectionTrait, Database};
use sea_orm_migration::MigratorTrait;

pub use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};

pub mod entities;
pub mod models;
pub mod seed;
pub mod types;

pub type DbPool = DatabaseConnection;

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

impl DBService {
    /// Connects to `database_url` and brings the schema up to date.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<DBService, DbErr> {
        ensure_sqlite_parent_dir(database_url)?;

        let mut options = ConnectOptions::new(database_url.to_string());
        options
            .max_connections(max_connections.max(1))
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let pool = Database::connect(options).await?;
        db_migration::Migrator::up(&pool, None).await?;
        tracing::debug!(backend = ?pool.get_database_backend(), "Database ready");
        Ok(DBService { pool })
    }
}

/// SQLite refuses to create the database file when its directory is missing.
fn ensure_sqlite_parent_dir(database_url: &str) -> Result<(), DbErr> {
    let Some(path) = sqlite_file_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = Path::new(path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| {
        DbErr::Custom(format!(
            "Failed to create database directory {}: {err}",
            parent.display()
        ))
    })
}

fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(path)
}
