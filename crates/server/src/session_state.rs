// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure, synchronous in-memory scene state. No I/O, no locking, no async —
//! every public function here is a total function from `(&mut SessionState,
//! Command)` to `Result<Outcome, ErrorCode>` so it can be driven directly by
//! the session actor, by recovery replay, and by property tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::model::{Object, Properties, Transform, User};

/// Colors assigned to users in join order, cycling once exhausted.
pub const PRESENCE_PALETTE: &[[f64; 3]] = &[
    [0.90, 0.10, 0.29],
    [0.24, 0.70, 0.29],
    [1.00, 0.88, 0.10],
    [0.00, 0.51, 0.78],
    [0.96, 0.51, 0.19],
    [0.57, 0.12, 0.71],
    [0.27, 0.94, 0.94],
    [0.94, 0.20, 0.90],
    [0.82, 0.96, 0.24],
    [0.98, 0.75, 0.83],
];

/// Maximum permitted clock skew, in milliseconds, a client's declared
/// `timestamp_ms` is allowed to lead the server's own clock by.
pub const MAX_CLOCK_SKEW_MS: i64 = 5_000;

/// Clamp a client-declared timestamp against the server's own clock to
/// bound how far into the future a skewed client can push it.
pub fn clamp_timestamp(timestamp_ms: i64, server_now_ms: i64) -> i64 {
    timestamp_ms.min(server_now_ms + MAX_CLOCK_SKEW_MS)
}

/// Events the session state machine emits on acceptance; these are the
/// domain-level shape the connection handler serializes onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ServerEvent {
    ObjectCreated { object: Object },
    ObjectDeleted { object_id: Uuid, deleted_by: String },
    TransformUpdated {
        object_id: Uuid,
        transform: Transform,
        updated_by: String,
        timestamp: i64,
    },
    PropertiesUpdated {
        object_id: Uuid,
        properties: Properties,
        updated_by: String,
        timestamp: i64,
    },
    NameUpdated {
        object_id: Uuid,
        name: String,
        updated_by: String,
        timestamp: i64,
    },
    UserJoined { user_id: String, display_name: String, color: [f64; 3] },
    UserLeft { user_id: String },
    UserSelected { user_id: String, object_id: Option<Uuid> },
}

/// Result of applying a command that was not rejected outright.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A mutation took effect; fan out `event` to every recipient but the
    /// originator, and persist to the event log iff `logged`.
    Broadcast { event: ServerEvent, logged: bool },
    /// The command was well-formed and uncontested but produced no
    /// observable change: a stale LWW update, or DELETE_OBJECT on an id
    /// that no longer exists. Not surfaced to any peer as an error.
    Dropped,
}

/// Commands accepted by `SessionState::apply`. `timestamp_ms` fields carry
/// the client-declared wall clock time, already clamped by the caller via
/// [`clamp_timestamp`].
#[derive(Debug, Clone)]
pub enum Command {
    JoinSession {
        user_id: String,
        display_name: String,
        timestamp_ms: i64,
    },
    LeaveSession {
        user_id: String,
    },
    CreateObject {
        object_id: Uuid,
        name: String,
        properties: Properties,
        asset_id: Option<String>,
        asset_library: Option<String>,
        transform: Transform,
        user_id: String,
        timestamp_ms: i64,
    },
    DeleteObject {
        object_id: Uuid,
        user_id: String,
    },
    UpdateTransform {
        object_id: Uuid,
        transform: Transform,
        user_id: String,
        timestamp_ms: i64,
    },
    UpdateProperties {
        object_id: Uuid,
        properties: Properties,
        user_id: String,
        timestamp_ms: i64,
    },
    UpdateName {
        object_id: Uuid,
        name: String,
        user_id: String,
        timestamp_ms: i64,
    },
    SelectObject {
        user_id: String,
        object_id: Option<Uuid>,
    },
}

/// Canonical, replayable scene state for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub objects: HashMap<Uuid, Object>,
    pub users: HashMap<String, User>,
    /// Monotonically increasing count of accepted commands, used as the
    /// event log's sequence number.
    pub seq: u64,
    /// Next seat index to hand out on join; never decreases.
    pub next_seat_index: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a command, mutating state on acceptance and bumping `seq`.
    /// Rejections (`Err`) never mutate state or advance `seq`.
    pub fn apply(&mut self, cmd: Command) -> Result<Outcome, ErrorCode> {
        let outcome = match cmd {
            Command::JoinSession {
                user_id,
                display_name,
                timestamp_ms,
            } => self.join(user_id, display_name, timestamp_ms)?,
            Command::LeaveSession { user_id } => self.leave(user_id)?,
            Command::CreateObject {
                object_id,
                name,
                properties,
                asset_id,
                asset_library,
                transform,
                user_id,
                timestamp_ms,
            } => self.create_object(
                object_id,
                name,
                properties,
                asset_id,
                asset_library,
                transform,
                user_id,
                timestamp_ms,
            )?,
            Command::DeleteObject { object_id, user_id } => {
                self.delete_object(object_id, user_id)
            }
            Command::UpdateTransform {
                object_id,
                transform,
                user_id,
                timestamp_ms,
            } => self.update_transform(object_id, transform, user_id, timestamp_ms),
            Command::UpdateProperties {
                object_id,
                properties,
                user_id,
                timestamp_ms,
            } => self.update_properties(object_id, properties, user_id, timestamp_ms)?,
            Command::UpdateName {
                object_id,
                name,
                user_id,
                timestamp_ms,
            } => self.update_name(object_id, name, user_id, timestamp_ms),
            Command::SelectObject { user_id, object_id } => {
                self.select_object(user_id, object_id)?
            }
        };
        if matches!(outcome, Outcome::Broadcast { logged: true, .. }) {
            self.seq += 1;
        }
        Ok(outcome)
    }

    fn join(
        &mut self,
        user_id: String,
        display_name: String,
        timestamp_ms: i64,
    ) -> Result<Outcome, ErrorCode> {
        if self.users.contains_key(&user_id) {
            return Err(ErrorCode::DuplicateUser);
        }
        let seat_index = self.next_seat_index;
        self.next_seat_index += 1;
        let color_rgb = PRESENCE_PALETTE[(seat_index as usize) % PRESENCE_PALETTE.len()];
        let user = User {
            user_id: user_id.clone(),
            display_name: display_name.clone(),
            color_rgb,
            selected_object: None,
            connected_at: timestamp_ms,
            seat_index,
        };
        self.users.insert(user_id.clone(), user);
        Ok(Outcome::Broadcast {
            event: ServerEvent::UserJoined {
                user_id,
                display_name,
                color: color_rgb,
            },
            logged: false,
        })
    }

    fn leave(&mut self, user_id: String) -> Result<Outcome, ErrorCode> {
        if self.users.remove(&user_id).is_none() {
            return Err(ErrorCode::NotJoined);
        }
        Ok(Outcome::Broadcast {
            event: ServerEvent::UserLeft { user_id },
            logged: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn create_object(
        &mut self,
        object_id: Uuid,
        name: String,
        properties: Properties,
        asset_id: Option<String>,
        asset_library: Option<String>,
        transform: Transform,
        user_id: String,
        timestamp_ms: i64,
    ) -> Result<Outcome, ErrorCode> {
        if self.objects.contains_key(&object_id) {
            return Err(ErrorCode::DuplicateObject);
        }
        let is_asset_ref = properties.kind() == crate::model::ObjectKind::AssetRef;
        if is_asset_ref != asset_id.is_some() || is_asset_ref != asset_library.is_some() {
            return Err(ErrorCode::Malformed);
        }
        if !properties.within_declared_bounds() {
            return Err(ErrorCode::Malformed);
        }
        let object = Object::new(
            object_id,
            name,
            properties,
            asset_id,
            asset_library,
            transform,
            timestamp_ms,
            user_id,
        );
        self.objects.insert(object_id, object.clone());
        Ok(Outcome::Broadcast {
            event: ServerEvent::ObjectCreated { object },
            logged: true,
        })
    }

    fn delete_object(&mut self, object_id: Uuid, user_id: String) -> Outcome {
        if self.objects.remove(&object_id).is_none() {
            // Idempotent: deleting an id that doesn't exist is a silent
            // success, not UNKNOWN_OBJECT.
            return Outcome::Dropped;
        }
        for user in self.users.values_mut() {
            if user.selected_object == Some(object_id) {
                user.selected_object = None;
            }
        }
        Outcome::Broadcast {
            event: ServerEvent::ObjectDeleted {
                object_id,
                deleted_by: user_id,
            },
            logged: true,
        }
    }

    /// Last-write-wins gate shared by every per-object mutation: the
    /// incoming (already clamped) timestamp must strictly exceed the
    /// object's recorded `last_updated_at`. Equal timestamps discard —
    /// deterministic, independent of arrival order.
    fn lww_allows(object: &Object, timestamp_ms: i64) -> bool {
        timestamp_ms > object.last_updated_at
    }

    fn update_transform(
        &mut self,
        object_id: Uuid,
        transform: Transform,
        user_id: String,
        timestamp_ms: i64,
    ) -> Outcome {
        let Some(object) = self.objects.get_mut(&object_id) else {
            return Outcome::Dropped;
        };
        if !Self::lww_allows(object, timestamp_ms) {
            return Outcome::Dropped;
        }
        object.transform = transform;
        object.last_updated_at = timestamp_ms;
        object.last_updated_by = user_id.clone();
        Outcome::Broadcast {
            event: ServerEvent::TransformUpdated {
                object_id,
                transform,
                updated_by: user_id,
                timestamp: timestamp_ms,
            },
            logged: true,
        }
    }

    fn update_properties(
        &mut self,
        object_id: Uuid,
        properties: Properties,
        user_id: String,
        timestamp_ms: i64,
    ) -> Result<Outcome, ErrorCode> {
        let Some(object) = self.objects.get_mut(&object_id) else {
            return Ok(Outcome::Dropped);
        };
        if !properties.matches_kind(object.kind) {
            return Err(ErrorCode::Malformed);
        }
        if !properties.within_declared_bounds() {
            return Err(ErrorCode::Malformed);
        }
        if !Self::lww_allows(object, timestamp_ms) {
            return Ok(Outcome::Dropped);
        }
        object.properties = properties.clone();
        object.last_updated_at = timestamp_ms;
        object.last_updated_by = user_id.clone();
        Ok(Outcome::Broadcast {
            event: ServerEvent::PropertiesUpdated {
                object_id,
                properties,
                updated_by: user_id,
                timestamp: timestamp_ms,
            },
            logged: true,
        })
    }

    fn update_name(
        &mut self,
        object_id: Uuid,
        name: String,
        user_id: String,
        timestamp_ms: i64,
    ) -> Outcome {
        let Some(object) = self.objects.get_mut(&object_id) else {
            return Outcome::Dropped;
        };
        if !Self::lww_allows(object, timestamp_ms) {
            return Outcome::Dropped;
        }
        object.name = name.clone();
        object.last_updated_at = timestamp_ms;
        object.last_updated_by = user_id.clone();
        Outcome::Broadcast {
            event: ServerEvent::NameUpdated {
                object_id,
                name,
                updated_by: user_id,
                timestamp: timestamp_ms,
            },
            logged: true,
        }
    }

    fn select_object(
        &mut self,
        user_id: String,
        object_id: Option<Uuid>,
    ) -> Result<Outcome, ErrorCode> {
        if let Some(id) = object_id {
            if !self.objects.contains_key(&id) {
                return Err(ErrorCode::UnknownObject);
            }
        }
        let user = self.users.get_mut(&user_id).ok_or(ErrorCode::NotJoined)?;
        user.selected_object = object_id;
        Ok(Outcome::Broadcast {
            // Selection is ephemeral presence state, not durable scene
            // state: never appended to the event log.
            event: ServerEvent::UserSelected { user_id, object_id },
            logged: false,
        })
    }
}

#[cfg(test)]
#[path = "session_state_tests.rs"]
mod tests;
