//! Toolgate server binary.
//!
//! Configures the OAuth 2.1 authorization server in front of the protected
//! tool endpoint and serves HTTP until interrupted.

use anyhow::Result;
use std::{env, sync::Arc, time::Duration};
use toolgate::{
    config::{Config, load_seed_clients},
    http::{AppState, build_router},
    storage::{cleanup_expired, traits::OAuthStorage},
};

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "toolgate=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let version = toolgate::config::version()?;

    if env::args().any(|arg| arg == "--version") {
        println!("{version}");
        return Ok(());
    }

    tracing::info!(?version, "Starting toolgate");

    let config = Config::new()?;
    let http_port = *config.http_port.as_ref();
    let cleanup_interval = *config.cleanup_interval.as_ref();
    let clients_file = config.clients_file.clone();

    let app_state = AppState::from_config(config)?;

    if let Some(path) = clients_file {
        let seeds = load_seed_clients(&path).await?;
        let count = seeds.len();
        for seed in seeds {
            app_state.client_registration_service.seed_client(seed).await?;
        }
        tracing::info!(count, path = %path, "pre-seeded clients loaded");
    }

    tracing::info!(
        resource = %app_state.resource_server.resource_policy().canonical(),
        strict = app_state.resource_server.resource_policy().is_strict(),
        registration = app_state.client_registration_service.registration_enabled(),
        "OAuth services ready"
    );

    let oauth_storage = app_state.oauth_storage.clone();
    let app = build_router(app_state);

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    {
        let tracker = tracker.clone();
        let inner_token = token.clone();

        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to install signal handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = inner_token.cancelled() => { },
                _ = terminate => {},
                _ = ctrl_c => {},
            }

            tracker.close();
            inner_token.cancel();
        });
    }

    if let Some(interval) = cleanup_interval {
        spawn_cleanup_task(&tracker, token.clone(), oauth_storage, interval);
    }

    {
        let bind_address = format!("0.0.0.0:{http_port}");
        tracing::info!("Starting server on {bind_address}");
        let listener = TcpListener::bind(&bind_address).await?;

        let inner_token = token.clone();
        tracker.spawn(async move {
            let shutdown_token = inner_token.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    tracing::info!("axum graceful shutdown complete");
                })
                .await;
            if let Err(err) = result {
                tracing::error!("axum task failed: {}", err);
            }

            inner_token.cancel();
        });
    }

    tracker.wait().await;

    Ok(())
}

/// Periodically purge expired records until shutdown
fn spawn_cleanup_task(
    tracker: &TaskTracker,
    token: CancellationToken,
    storage: Arc<dyn OAuthStorage>,
    interval: Duration,
) {
    tracing::info!(?interval, "expiry sweep enabled");

    tracker.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = cleanup_expired(storage.as_ref()).await {
                        tracing::error!(error = %err, "expiry sweep failed");
                    }
                }
            }
        }
    });
}
