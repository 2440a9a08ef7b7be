//! Fills an empty store with the demo users, teams and tasks.

use anyhow::Context;
use server::{Deployment, DeploymentImpl};
use tracing_subscriber::{EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,seed=info,db=info"))
        .context("Failed to create tracing filter")?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let deployment = DeploymentImpl::new()
        .await
        .context("Failed to open the store")?;

    match db::seed::seed(&deployment.db().pool).await? {
        Some(report) => tracing::info!(
            users = report.users,
            teams = report.teams,
            tasks = report.tasks,
            "Seed completed"
        ),
        None => tracing::info!("Nothing to seed"),
    }
    Ok(())
}
