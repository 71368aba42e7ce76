// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide counters and a rolling latency window, snapshotted for
//! `GET /metrics`. Plain atomics plus a lock-guarded ring, the same shape
//! the teacher uses for session usage accounting — deliberately not routed
//! through a Prometheus exporter crate, since the wire shape here is a
//! fixed bespoke JSON document, not an exposition format.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

const LATENCY_WINDOW: usize = 1_000;

struct LatencyWindow {
    samples: Vec<i64>,
    next: usize,
    filled: usize,
}

impl LatencyWindow {
    fn new() -> Self {
        Self {
            samples: vec![0; LATENCY_WINDOW],
            next: 0,
            filled: 0,
        }
    }

    fn record(&mut self, micros: i64) {
        self.samples[self.next] = micros;
        self.next = (self.next + 1) % LATENCY_WINDOW;
        self.filled = (self.filled + 1).min(LATENCY_WINDOW);
    }

    fn percentiles(&self) -> (i64, i64, i64) {
        if self.filled == 0 {
            return (0, 0, 0);
        }
        let mut sorted = self.samples[..self.filled].to_vec();
        sorted.sort_unstable();
        let pick = |p: f64| -> i64 {
            let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        (pick(0.50), pick(0.95), pick(0.99))
    }
}

/// Snapshot document returned by `GET /metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub active_sessions: u64,
    pub active_connections: u64,
    pub messages_in_total: u64,
    pub messages_out_total: u64,
    pub transform_updates_total: u64,
    pub propagation_latency_us_p50: i64,
    pub propagation_latency_us_p95: i64,
    pub propagation_latency_us_p99: i64,
}

pub struct Metrics {
    active_sessions: AtomicI64,
    active_connections: AtomicI64,
    messages_in_total: AtomicU64,
    messages_out_total: AtomicU64,
    transform_updates_total: AtomicU64,
    latency: Mutex<LatencyWindow>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            active_sessions: AtomicI64::new(0),
            active_connections: AtomicI64::new(0),
            messages_in_total: AtomicU64::new(0),
            messages_out_total: AtomicU64::new(0),
            transform_updates_total: AtomicU64::new(0),
            latency: Mutex::new(LatencyWindow::new()),
        }
    }

    pub fn session_created(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_destroyed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_in(&self) {
        self.messages_in_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_out(&self) {
        self.messages_out_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transform_update(&self) {
        self.transform_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one broadcast's propagation latency: `egress_enqueue_time -
    /// command_receive_time`, in microseconds.
    pub fn record_propagation_latency_us(&self, micros: i64) {
        self.latency.lock().record(micros);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99) = self.latency.lock().percentiles();
        MetricsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed).max(0) as u64,
            active_connections: self.active_connections.load(Ordering::Relaxed).max(0) as u64,
            messages_in_total: self.messages_in_total.load(Ordering::Relaxed),
            messages_out_total: self.messages_out_total.load(Ordering::Relaxed),
            transform_updates_total: self.transform_updates_total.load(Ordering::Relaxed),
            propagation_latency_us_p50: p50,
            propagation_latency_us_p95: p95,
            propagation_latency_us_p99: p99,
        }
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
