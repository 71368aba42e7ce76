// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level process wiring: tracing init, recovery boot, HTTP/WebSocket
//! server bind, and graceful shutdown on SIGINT/SIGTERM.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::boot;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::transport::{build_router, Store};

/// Initialize the global tracing subscriber from `config`. A no-op if a
/// subscriber is already installed (e.g. by a test harness).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run the server to completion: bind the listener, recover any persisted
/// sessions, serve until a shutdown signal arrives, then drain every live
/// session actor before returning.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(SessionRegistry::new(
        config.data_dir.clone(),
        config.global_session_cap,
        config.session_user_cap,
        config.compaction_threshold,
        Arc::clone(&metrics),
        shutdown.clone(),
    ));

    let recovered = boot::recover(
        &config.data_dir,
        config.session_user_cap,
        config.compaction_threshold,
        Arc::clone(&metrics),
        shutdown.clone(),
        &registry,
    )?;
    info!(recovered, "recovery boot complete");

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    let bound_addr = listener.local_addr()?;
    info!(addr = %bound_addr, "listening");

    let store = Arc::new(Store {
        registry: Arc::clone(&registry),
        metrics,
        config,
        shutdown: shutdown.clone(),
    });
    let app = build_router(store);

    spawn_signal_handler(shutdown.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    info!("draining session actors");
    registry.shutdown_all().await;
    Ok(())
}

/// Watch for SIGTERM/SIGINT and cancel `shutdown` on the first one. A
/// second signal forces an immediate exit rather than waiting on a wedged
/// drain.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
