use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use support_backend::core::config::get_settings;
use support_backend::core::logging;
use support_backend::server;
use support_backend::state::AppState;
use support_backend::support::spawn_memory_reaper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = get_settings().context("Failed to load settings")?;
    logging::init(settings);

    tracing::info!(
        app = %settings.app_name,
        version = %settings.app_version,
        debug = settings.debug,
        "application_starting"
    );
    tracing::debug!(settings = %settings.redacted(), "settings_loaded");

    let settings = Arc::new(settings.clone());
    let state = AppState::initialize(settings.clone()).await?;

    if settings.sentry_dsn.is_some() {
        tracing::warn!("SENTRY_DSN is set but no error reporter is bundled; errors are only logged");
    }

    let reaper = spawn_memory_reaper(
        state.memory.clone(),
        Duration::from_secs(settings.memory_reaper_interval_secs),
    );

    let bind_addr = settings.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reaper.abort();
    tracing::info!("application_shutting_down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
