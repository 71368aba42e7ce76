// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state handed to every axum handler and every
//! WebSocket connection task via the `State` extractor.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;

/// Process-wide state: the session registry (component E), metrics
/// (component G), the static config, and the shutdown signal every task
/// watches.
pub struct Store {
    pub registry: Arc<SessionRegistry>,
    pub metrics: Arc<Metrics>,
    pub config: Config,
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.config.data_dir)
            .field("auth_token", &self.config.auth_token.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
