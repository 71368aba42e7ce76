// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level WebSocket envelope and payload types.
//!
//! Every frame in either direction is one envelope: `{event_type,
//! timestamp, source_user_id, payload}`. `payload`'s shape depends on
//! `event_type`, so parsing is two-step: decode the envelope generically,
//! then dispatch on `event_type` to decode `payload` into the matching
//! struct.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::model::{Object, ObjectKind, Properties, Transform, User};

/// The envelope shared by every frame. `payload` is left as a raw value on
/// the way in and dispatched by `event_type`; on the way out it is built
/// from a `ServerMessage` by [`ServerMessage::into_envelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub event_type: String,
    pub timestamp: i64,
    pub source_user_id: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinSessionPayload {
    pub session_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateObjectPayload {
    pub object_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub asset_library: Option<String>,
    pub transform: Transform,
    pub properties: Properties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteObjectPayload {
    pub object_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTransformPayload {
    pub object_id: Uuid,
    pub transform: Transform,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePropertiesPayload {
    pub object_id: Uuid,
    pub properties: Properties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateNamePayload {
    pub object_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectObjectPayload {
    pub object_id: Option<Uuid>,
}

/// A fully parsed client frame: the dispatched payload plus the envelope
/// fields every command needs (`timestamp`, `source_user_id`).
#[derive(Debug, Clone)]
pub enum ClientMessage {
    JoinSession(JoinSessionPayload),
    LeaveSession,
    CreateObject(CreateObjectPayload),
    DeleteObject(DeleteObjectPayload),
    UpdateTransform(UpdateTransformPayload),
    UpdateProperties(UpdatePropertiesPayload),
    UpdateName(UpdateNamePayload),
    SelectObject(SelectObjectPayload),
}

/// Parse one text frame into its envelope fields and dispatched payload.
/// Any structural failure (bad JSON, unknown `event_type`, payload that
/// doesn't match its declared shape) is reported as `MALFORMED`.
pub fn parse_client_frame(text: &str) -> Result<(ClientMessage, i64, String), ErrorCode> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(|_| ErrorCode::Malformed)?;
    let payload = |v: Value| serde_json::from_value(v).map_err(|_| ErrorCode::Malformed);
    let message = match raw.event_type.as_str() {
        "JOIN_SESSION" => ClientMessage::JoinSession(payload(raw.payload)?),
        "LEAVE_SESSION" => ClientMessage::LeaveSession,
        "CREATE_OBJECT" => ClientMessage::CreateObject(payload(raw.payload)?),
        "DELETE_OBJECT" => ClientMessage::DeleteObject(payload(raw.payload)?),
        "UPDATE_TRANSFORM" => ClientMessage::UpdateTransform(payload(raw.payload)?),
        "UPDATE_PROPERTIES" => ClientMessage::UpdateProperties(payload(raw.payload)?),
        "UPDATE_NAME" => ClientMessage::UpdateName(payload(raw.payload)?),
        "SELECT_OBJECT" => ClientMessage::SelectObject(payload(raw.payload)?),
        _ => return Err(ErrorCode::Malformed),
    };
    Ok((message, raw.timestamp, raw.source_user_id))
}

/// Server-to-client payload bodies. `into_envelope` wraps one of these
/// into the wire `RawEnvelope` shape with the given `source_user_id`
/// (the acting user for mutation/presence events, or `"server"` for
/// session-level frames with no single actor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    FullStateSync {
        session_id: String,
        objects: HashMap<Uuid, Object>,
        users: HashMap<String, User>,
    },
    ObjectCreated {
        object: Object,
    },
    ObjectDeleted {
        object_id: Uuid,
        deleted_by: String,
    },
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
    UserJoined {
        user_id: String,
        display_name: String,
        color: [f64; 3],
    },
    UserLeft {
        user_id: String,
    },
    UserSelected {
        user_id: String,
        object_id: Option<Uuid>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::FullStateSync { .. } => "FULL_STATE_SYNC",
            Self::ObjectCreated { .. } => "OBJECT_CREATED",
            Self::ObjectDeleted { .. } => "OBJECT_DELETED",
            Self::TransformUpdated { .. } => "TRANSFORM_UPDATED",
            Self::PropertiesUpdated { .. } => "PROPERTIES_UPDATED",
            Self::NameUpdated { .. } => "NAME_UPDATED",
            Self::UserJoined { .. } => "USER_JOINED",
            Self::UserLeft { .. } => "USER_LEFT",
            Self::UserSelected { .. } => "USER_SELECTED",
            Self::Error { .. } => "ERROR",
        }
    }

    /// `(object_id, source_user_id)` identity used for per-recipient
    /// transform coalescing: a later `TransformUpdated` for the same pair
    /// replaces an unsent earlier one already queued for the same
    /// recipient.
    pub fn coalesce_key(&self) -> Option<(Uuid, &str)> {
        match self {
            Self::TransformUpdated {
                object_id,
                updated_by,
                ..
            } => Some((*object_id, updated_by.as_str())),
            _ => None,
        }
    }

    pub fn actor_user_id(&self) -> &str {
        match self {
            Self::TransformUpdated { updated_by, .. }
            | Self::PropertiesUpdated { updated_by, .. }
            | Self::NameUpdated { updated_by, .. } => updated_by,
            Self::ObjectDeleted { deleted_by, .. } => deleted_by,
            Self::UserJoined { user_id, .. }
            | Self::UserLeft { user_id }
            | Self::UserSelected { user_id, .. } => user_id,
            Self::ObjectCreated { object } => &object.created_by,
            Self::FullStateSync { .. } | Self::Error { .. } => "server",
        }
    }

    pub fn into_envelope(self, timestamp: i64) -> RawEnvelope {
        let event_type = self.event_type().to_owned();
        let source_user_id = self.actor_user_id().to_owned();
        let payload = serde_json::to_value(&self).unwrap_or(Value::Null);
        RawEnvelope {
            event_type,
            timestamp,
            source_user_id,
            payload,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.as_str().to_owned(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
