pub mod api;
pub mod core;
pub mod error;
pub mod providers;
pub mod scheduler;
pub mod store;

use crate::core::config::AppConfig;
use anyhow::{Context, Result, anyhow};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs the service until SIGINT/SIGTERM: price ingestion in the background and
/// the read endpoint in the foreground.
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Price service starting...");
    debug!("Loaded config: {config:#?}");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    serve(config, listener, shutdown_signal()).await
}

/// Serves on `listener` until `shutdown` resolves or the HTTP server stops on
/// its own. The scheduler and server drains share `shutdown_timeout`, and the
/// store is flushed last.
pub async fn serve<F>(config: AppConfig, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let store = store::open_store(&config)?;
    let provider = providers::build_provider(config.provider, &config.providers)
        .with_context(|| format!("Failed to set up {} provider", config.provider))?;

    let scheduler = Arc::new(
        scheduler::Scheduler::new(
            config.currencies.clone(),
            &config.quoted_currency,
            config.update_interval,
            Arc::clone(&provider),
            Arc::clone(&store),
        )
        .with_concurrency(config.fetch_concurrency),
    );

    let state = Arc::new(api::AppState {
        store: Arc::clone(&store),
        quoted_currency: config.quoted_currency.clone(),
    });
    let router = api::app_router(state, provider.name());
    let addr = listener.local_addr().context("Failed to read listener address")?;

    let scheduler_handle = scheduler.start();

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });
    info!("Listening and serving at {addr} (/price/{})", provider.name());

    let server_result = tokio::select! {
        _ = shutdown => {
            info!("Shutting down server...");
            None
        }
        result = &mut server => Some(result),
    };

    // Stop intake first, then drain in-flight work before releasing the store.
    // Both drains share one deadline.
    let deadline = Instant::now() + config.shutdown_timeout;
    if shutdown_tx.send(true).is_err() {
        debug!("HTTP server already stopped");
    }
    if let Err(e) = scheduler_handle
        .shutdown(deadline.saturating_duration_since(Instant::now()))
        .await
    {
        error!(error = %e, "Price update did not stop cleanly");
    }

    let server_failure = match server_result {
        // The server exited on its own before any signal arrived
        Some(result) => Some(
            server_outcome(result).unwrap_or_else(|| anyhow!("HTTP server stopped unexpectedly")),
        ),
        None => match tokio::time::timeout_at(deadline, server).await {
            Ok(result) => server_outcome(result),
            Err(_) => {
                warn!("Server forced to shutdown");
                None
            }
        },
    };

    store.flush().await.context("Failed to flush store")?;
    if let Some(e) = server_failure {
        return Err(e);
    }
    info!("Server shut down gracefully");
    Ok(())
}

/// Fetches a single price with the configured provider.
pub async fn fetch_once(config: &AppConfig, base: &str, quoted: Option<&str>) -> Result<f64> {
    let provider = providers::build_provider(config.provider, &config.providers)
        .with_context(|| format!("Failed to set up {} provider", config.provider))?;
    let quoted = quoted.unwrap_or(&config.quoted_currency).to_uppercase();
    let price = provider
        .fetch_price(&base.to_uppercase(), &quoted)
        .await
        .with_context(|| format!("Failed to get price from {}", provider.name()))?;
    Ok(price)
}

fn server_outcome(result: Result<std::io::Result<()>, JoinError>) -> Option<anyhow::Error> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(anyhow::Error::new(e).context("Server encountered an error")),
        Err(e) => Some(anyhow::Error::new(e).context("Server task failed")),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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
