use std::future::IntoFuture;

use server::{DeploymentImpl, LocalDeployment, deployment::DeploymentError, http};
use thiserror::Error;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, prelude::*};

const GRACEFUL_SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TeamTrackError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error("Invalid log filter: {0}")]
    LogFilter(String),
}

/// Bare levels apply to this workspace's crates; anything else is used as a full directive.
fn filter_directives(log_level: Option<&str>) -> String {
    let level = log_level.map(str::trim).filter(|level| !level.is_empty());
    match level {
        Some(level) if level.contains('=') || level.contains(',') => level.to_string(),
        level => format!(
            "warn,server={level},db={level},config={level},tower_http={level}",
            level = level.unwrap_or("info")
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), TeamTrackError> {
    let (asset_dir, config) = LocalDeployment::load_runtime_config().await?;

    let env_filter = EnvFilter::try_new(filter_directives(config.log_level.as_deref()))
        .map_err(|err| TeamTrackError::LogFilter(err.to_string()))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let bind_addr = config.server.bind_addr();
    let deployment: DeploymentImpl = LocalDeployment::with_config(&asset_dir, config).await?;
    let app_router = http::router(deployment);

    let listener = tokio::net::TcpListener::bind(bind_addr.as_str()).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Server running on http://{local_addr}");

    let shutdown_rx = spawn_shutdown_watcher();
    let server = axum::serve(listener, app_router)
        .with_graceful_shutdown(wait_for_watch_true(shutdown_rx.clone()))
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => res?,
        _ = shutdown_deadline(shutdown_rx, GRACEFUL_SHUTDOWN_TIMEOUT) => {
            tracing::warn!(
                "Graceful shutdown timed out after {:?}, exiting",
                GRACEFUL_SHUTDOWN_TIMEOUT
            );
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Flips the returned channel to `true` on the first SIGINT or SIGTERM.
fn spawn_shutdown_watcher() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::error!("Failed to install SIGINT handler: {e}");
                    return;
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {e}");
                    None
                }
            };

            tokio::select! {
                _ = sigint.recv() => {},
                _ = async {
                    if let Some(sigterm) = sigterm.as_mut() {
                        sigterm.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                } => {},
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                return;
            }
        }

        tracing::info!("Shutdown signal received, starting graceful shutdown");
        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

async fn wait_for_watch_true(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }

        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn shutdown_deadline(rx: watch::Receiver<bool>, timeout: std::time::Duration) {
    wait_for_watch_true(rx).await;
    tokio::time::sleep(timeout).await;
}
