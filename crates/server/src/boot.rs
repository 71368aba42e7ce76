// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery Boot (component H): on process start, rehydrate every session
//! that has a log or snapshot on disk and register it with the registry
//! before the server starts accepting connections.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::actor;
use crate::event_log::{Entry, EntryPayload, EventLog};
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::session_state::Command;

/// Scan `data_dir` for `<session_id>.log` and `<session_id>.snapshot.json`
/// files, replay each session's history, and register a live actor for
/// it. Sessions with no file of either kind simply don't exist yet and
/// are created lazily on first join.
pub fn recover(
    data_dir: &Path,
    session_user_cap: usize,
    compaction_threshold: u64,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    registry: &SessionRegistry,
) -> anyhow::Result<usize> {
    let mut recovered = 0;
    for session_id in discover_session_ids(data_dir)? {
        let mut log = EventLog::open(data_dir, &session_id)?.with_compaction_threshold(compaction_threshold);
        let (mut state, entries) = log.replay()?;
        for entry in &entries {
            apply_entry(&mut state, entry, &session_id);
        }
        let handle = actor::spawn(
            session_id.clone(),
            log,
            state,
            session_user_cap,
            Arc::clone(&metrics),
            shutdown.clone(),
        );
        registry.register(handle);
        recovered += 1;
        info!(session_id, entries = entries.len(), "session recovered");
    }
    Ok(recovered)
}

fn discover_session_ids(data_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut ids = HashSet::new();
    let read_dir = match std::fs::read_dir(data_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = name.strip_suffix(".snapshot.json") {
            ids.insert(id.to_owned());
        } else if let Some(id) = name.strip_suffix(".log") {
            ids.insert(id.to_owned());
        }
    }
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    Ok(ids)
}

fn apply_entry(state: &mut crate::session_state::SessionState, entry: &Entry, session_id: &str) {
    let command = to_command(entry.payload.clone());
    if let Err(code) = state.apply(command) {
        warn!(session_id, seq = entry.seq, %code, "skipping unreplayable log entry during recovery");
    }
}

fn to_command(payload: EntryPayload) -> Command {
    match payload {
        EntryPayload::CreateObject {
            object_id,
            name,
            properties,
            asset_id,
            asset_library,
            transform,
            user_id,
            timestamp_ms,
        } => Command::CreateObject {
            object_id,
            name,
            properties,
            asset_id,
            asset_library,
            transform,
            user_id,
            timestamp_ms,
        },
        EntryPayload::DeleteObject { object_id, user_id } => Command::DeleteObject { object_id, user_id },
        EntryPayload::UpdateTransform {
            object_id,
            transform,
            user_id,
            timestamp_ms,
        } => Command::UpdateTransform {
            object_id,
            transform,
            user_id,
            timestamp_ms,
        },
        EntryPayload::UpdateProperties {
            object_id,
            properties,
            user_id,
            timestamp_ms,
        } => Command::UpdateProperties {
            object_id,
            properties,
            user_id,
            timestamp_ms,
        },
        EntryPayload::UpdateName {
            object_id,
            name,
            user_id,
            timestamp_ms,
        } => Command::UpdateName {
            object_id,
            name,
            user_id,
            timestamp_ms,
        },
    }
}

#[cfg(test)]
#[path = "boot_tests.rs"]
mod tests;
