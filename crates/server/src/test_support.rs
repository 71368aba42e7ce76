// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders and an in-process server spawner.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::transport::state::Store;

/// Extension trait to convert any `Display` error into `anyhow::Error`.
/// Replaces `.map_err(|e| anyhow::anyhow!("{e}"))` with `.anyhow()`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Builder for constructing a test [`Store`] backed by a fresh temp data
/// directory, with sensible defaults for every cap.
pub struct StoreBuilder {
    auth_token: Option<String>,
    global_session_cap: usize,
    session_user_cap: usize,
    egress_queue_capacity: usize,
    message_rate_limit: u32,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            auth_token: None,
            global_session_cap: 20,
            session_user_cap: 10,
            egress_queue_capacity: 1024,
            message_rate_limit: 100,
        }
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn global_session_cap(mut self, n: usize) -> Self {
        self.global_session_cap = n;
        self
    }

    pub fn session_user_cap(mut self, n: usize) -> Self {
        self.session_user_cap = n;
        self
    }

    pub fn egress_queue_capacity(mut self, n: usize) -> Self {
        self.egress_queue_capacity = n;
        self
    }

    pub fn message_rate_limit(mut self, n: u32) -> Self {
        self.message_rate_limit = n;
        self
    }

    #[allow(clippy::expect_used)]
    pub fn build(self) -> Arc<Store> {
        let data_dir = tempfile::tempdir().expect("tempdir").into_path();

        let config = Config {
            host: "127.0.0.1".to_owned(),
            port: 0,
            data_dir,
            auth_token: self.auth_token,
            global_session_cap: self.global_session_cap,
            session_user_cap: self.session_user_cap,
            egress_queue_capacity: self.egress_queue_capacity,
            message_rate_limit: self.message_rate_limit,
            compaction_threshold: 1_000,
            ping_interval_secs: 120,
            pong_timeout_secs: 30,
            log_format: "text".to_owned(),
            log_level: "warn".to_owned(),
        };
        let metrics = Arc::new(Metrics::new());
        let shutdown = CancellationToken::new();
        let registry = Arc::new(SessionRegistry::new(
            config.data_dir.clone(),
            config.global_session_cap,
            config.session_user_cap,
            config.compaction_threshold,
            Arc::clone(&metrics),
            shutdown.clone(),
        ));
        Arc::new(Store {
            registry,
            metrics,
            config,
            shutdown,
        })
    }
}

/// Bind `state`'s router to an ephemeral localhost port and run it in the
/// background, returning its address and the task handle. Used by
/// WebSocket/HTTP integration tests that need a real socket.
pub async fn spawn_http_server(state: Arc<Store>) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = crate::transport::build_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, handle))
}
