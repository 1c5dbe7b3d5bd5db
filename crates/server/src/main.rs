mod bootstrap;
mod error;
mod events;
mod health;
mod recommendations;
mod routes;
mod sessions;
#[cfg(test)]
mod test_support;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use livequote_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use livequote_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let router = routes::app(app.api_state(), app.health_state());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "livequote-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .into_future();

    // Event streams never end on their own, so draining is bounded.
    tokio::select! {
        result = server => result?,
        () = drain_deadline(shutdown, grace) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "graceful shutdown window elapsed with open connections"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        active_sessions = app.runtime.session_count().await,
        "livequote-server stopping"
    );
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown(shutdown: Arc<Notify>) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    shutdown.notify_one();
}

async fn drain_deadline(shutdown: Arc<Notify>, grace: Duration) {
    shutdown.notified().await;
    tokio::time::sleep(grace).await;
}
