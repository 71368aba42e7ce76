// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /metrics` (component G, spec.md §4.G/§6): a JSON snapshot of the
//! counters and rolling propagation-latency percentiles.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::metrics::MetricsSnapshot;
use crate::transport::state::Store;

pub async fn metrics(State(state): State<Arc<Store>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
