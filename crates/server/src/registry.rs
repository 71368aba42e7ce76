// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Registry (component E): the process-wide directory mapping
//! session names to running actors, and the global capacity gate.
//!
//! Grounded on the same shape the teacher uses for its pod directory and
//! its mux session table: a lock-guarded map behind a handle cheaply
//! cloned into every connection task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::actor::{self, SessionHandle};
use crate::error::ErrorCode;
use crate::event_log::EventLog;
use crate::metrics::Metrics;
use crate::session_state::SessionState;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    data_dir: PathBuf,
    global_session_cap: usize,
    session_user_cap: usize,
    compaction_threshold: u64,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    pub fn new(
        data_dir: PathBuf,
        global_session_cap: usize,
        session_user_cap: usize,
        compaction_threshold: u64,
        metrics: Arc<Metrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            data_dir,
            global_session_cap,
            session_user_cap,
            compaction_threshold,
            metrics,
            shutdown,
        }
    }

    /// Returns a handle to the named session's actor, creating it (with an
    /// empty state and a fresh log) if it doesn't exist yet. Rejects with
    /// `GLOBAL_SESSION_LIMIT` when the cap is reached and `session_id`
    /// does not already name a live session.
    pub fn join_or_create(&self, session_id: &str) -> Result<SessionHandle, ErrorCode> {
        if let Some(handle) = self.sessions.read().get(session_id).cloned() {
            return Ok(handle);
        }
        let mut sessions = self.sessions.write();
        if let Some(handle) = sessions.get(session_id) {
            return Ok(handle.clone());
        }
        if sessions.len() >= self.global_session_cap {
            return Err(ErrorCode::GlobalSessionLimit);
        }
        let log = EventLog::open(&self.data_dir, session_id)
            .map_err(|_| ErrorCode::Internal)?
            .with_compaction_threshold(self.compaction_threshold);
        let handle = actor::spawn(
            session_id.to_owned(),
            log,
            SessionState::new(),
            self.session_user_cap,
            Arc::clone(&self.metrics),
            self.shutdown.clone(),
        );
        sessions.insert(session_id.to_owned(), handle.clone());
        info!(session_id, "session created");
        Ok(handle)
    }

    /// Returns the named session's actor handle, if live.
    pub fn lookup(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Registers an already-running actor, bypassing the capacity gate.
    /// Used by recovery boot, which must rehydrate every persisted
    /// session regardless of the configured cap.
    pub fn register(&self, handle: SessionHandle) {
        self.sessions.write().insert(handle.session_id.clone(), handle);
    }

    pub fn session_user_cap(&self) -> usize {
        self.session_user_cap
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Shut down every live session actor, draining mailboxes and writing
    /// final snapshots before returning.
    pub async fn shutdown_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.read().values().cloned().collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
