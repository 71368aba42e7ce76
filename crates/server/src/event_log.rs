// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed append-only event log with snapshot-based compaction.
//!
//! One log per session at `<data_dir>/<session_id>.log`, newline-delimited
//! JSON, each line a self-describing `Entry`. An optional sidecar at
//! `<data_dir>/<session_id>.snapshot.json` holds the most recent compacted
//! state. `append` fsyncs before returning; `snapshot` writes to a temp
//! path, fsyncs, atomically renames over the sidecar, then truncates the
//! log to entries past the snapshot's `seq` — a crash between any of those
//! steps leaves either the old snapshot+full log or the new snapshot+log,
//! never a torn mix.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session_state::SessionState;

/// The mutating command kinds that are durable. Presence (join/leave/
/// select) is never written here — it is not part of recoverable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EntryPayload {
    CreateObject {
        object_id: Uuid,
        name: String,
        properties: crate::model::Properties,
        asset_id: Option<String>,
        asset_library: Option<String>,
        transform: crate::model::Transform,
        user_id: String,
        timestamp_ms: i64,
    },
    DeleteObject {
        object_id: Uuid,
        user_id: String,
    },
    UpdateTransform {
        object_id: Uuid,
        transform: crate::model::Transform,
        user_id: String,
        timestamp_ms: i64,
    },
    UpdateProperties {
        object_id: Uuid,
        properties: crate::model::Properties,
        user_id: String,
        timestamp_ms: i64,
    },
    UpdateName {
        object_id: Uuid,
        name: String,
        user_id: String,
        timestamp_ms: i64,
    },
}

/// A single self-describing, newline-delimited record in the log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub seq: u64,
    pub timestamp_ms: i64,
    pub payload: EntryPayload,
}

/// A compacted snapshot: the full state as of `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    seq: u64,
    state: SessionState,
}

/// How often (in appended entries since the last compaction) a snapshot is
/// triggered.
pub const COMPACTION_THRESHOLD: u64 = 1_000;

/// Append-only durable log for one session, plus its snapshot sidecar.
pub struct EventLog {
    log_path: PathBuf,
    snapshot_path: PathBuf,
    entries_since_snapshot: u64,
    compaction_threshold: u64,
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl EventLog {
    /// Open (without creating) the log for `session_id` under `data_dir`.
    /// Creates `data_dir` if missing.
    pub fn open(data_dir: &Path, session_id: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            log_path: data_dir.join(format!("{session_id}.log")),
            snapshot_path: data_dir.join(format!("{session_id}.snapshot.json")),
            entries_since_snapshot: 0,
            compaction_threshold: COMPACTION_THRESHOLD,
        })
    }

    /// Override the number of entries accumulated between snapshots.
    /// Defaults to [`COMPACTION_THRESHOLD`]; callers pass the configured
    /// `--compaction-threshold` here. A value of `0` is clamped to `1`.
    pub fn with_compaction_threshold(mut self, threshold: u64) -> Self {
        self.compaction_threshold = threshold.max(1);
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append an entry durably: the write and an `fsync` both complete
    /// before returning, so a power loss immediately after cannot lose it.
    /// Triggers a snapshot+compaction once `COMPACTION_THRESHOLD` entries
    /// have accumulated since the last one.
    pub fn append(
        &mut self,
        seq: u64,
        payload: EntryPayload,
        current_state: &SessionState,
    ) -> anyhow::Result<()> {
        let entry = Entry {
            seq,
            timestamp_ms: now_ms(),
            payload,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;

        self.entries_since_snapshot += 1;
        if self.entries_since_snapshot >= self.compaction_threshold {
            self.snapshot(seq, current_state)?;
        }
        Ok(())
    }

    /// Write a full snapshot of `state` at `seq`, then truncate the log to
    /// only entries with `seq` greater than the snapshot's. Crash-safe:
    /// write to a temp path, fsync, atomically rename over the sidecar,
    /// then rewrite the log's tail the same way — a crash mid-write
    /// leaves the prior snapshot (or none) intact and the full log still
    /// replayable; a partial snapshot file is simply ignored on recovery.
    pub fn snapshot(&mut self, seq: u64, state: &SessionState) -> anyhow::Result<()> {
        let snapshot = Snapshot {
            seq,
            state: state.clone(),
        };
        let tmp_path = self.snapshot_path.with_extension("snapshot.json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            serde_json::to_writer(&mut tmp, &snapshot)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.snapshot_path)?;

        let remaining = Self::read_entries(&self.log_path)?
            .into_iter()
            .filter(|e| e.seq > seq)
            .collect::<Vec<_>>();
        let log_tmp_path = self.log_path.with_extension("log.tmp");
        {
            let mut tmp = File::create(&log_tmp_path)?;
            for entry in &remaining {
                let mut line = serde_json::to_string(entry)?;
                line.push('\n');
                tmp.write_all(line.as_bytes())?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&log_tmp_path, &self.log_path)?;

        self.entries_since_snapshot = 0;
        Ok(())
    }

    /// Load the latest valid snapshot (or an empty state if none/corrupt)
    /// and the log entries with `seq` greater than the snapshot's seq, in
    /// order. The canonical replay entrypoint used by recovery boot.
    pub fn replay(&self) -> anyhow::Result<(SessionState, Vec<Entry>)> {
        let (base_seq, state) = match Self::read_snapshot(&self.snapshot_path) {
            Some(snapshot) => (snapshot.seq, snapshot.state),
            None => (0, SessionState::new()),
        };
        let entries = Self::read_entries(&self.log_path)?
            .into_iter()
            .filter(|e| e.seq > base_seq)
            .collect();
        Ok((state, entries))
    }

    /// Returns `None` if the snapshot file is absent, truncated, or
    /// otherwise fails to parse — a partial snapshot is simply ignored.
    fn read_snapshot(path: &Path) -> Option<Snapshot> {
        let contents = fs::read(path).ok()?;
        serde_json::from_slice(&contents).ok()
    }

    fn read_entries(path: &Path) -> anyhow::Result<Vec<Entry>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // A partial trailing write (crash mid-append) fails to parse
            // as JSON; skip it rather than aborting replay.
            if let Ok(entry) = serde_json::from_str::<Entry>(&line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
