// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Actor (component C) and the Presence Subsystem (component F)
//! that lives inside it.
//!
//! One task per session. It owns the only mutable handle to that session's
//! `SessionState` and `EventLog`; every other task reaches it only through
//! a single-consumer mailbox, which is what gives the system its ordering
//! guarantee: all observers of a session see broadcasts derived from the
//! same sequence of accepted mutations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::egress::{self, EgressSender};
use crate::error::ErrorCode;
use crate::event_log::{EntryPayload, EventLog};
use crate::metrics::Metrics;
use crate::model::User;
use crate::session_state::{clamp_timestamp, Command, Outcome, ServerEvent, SessionState};
use crate::transport::ws_msg::{
    CreateObjectPayload, DeleteObjectPayload, SelectObjectPayload, ServerMessage,
    UpdateNamePayload, UpdatePropertiesPayload, UpdateTransformPayload,
};

/// The non-JOIN/LEAVE command payloads a connection routes to the actor.
#[derive(Debug, Clone)]
pub enum CommandPayload {
    CreateObject(CreateObjectPayload),
    DeleteObject(DeleteObjectPayload),
    UpdateTransform(UpdateTransformPayload),
    UpdateProperties(UpdatePropertiesPayload),
    UpdateName(UpdateNamePayload),
    SelectObject(SelectObjectPayload),
}

/// Data for the `FULL_STATE_SYNC` response sent only to a joining
/// connection, never broadcast.
pub struct FullStateSync {
    pub session_id: String,
    pub objects: HashMap<Uuid, crate::model::Object>,
    pub users: HashMap<String, User>,
}

enum ActorMessage {
    Join {
        user_id: String,
        display_name: String,
        timestamp_ms: i64,
        egress: EgressSender,
        reply: oneshot::Sender<Result<FullStateSync, ErrorCode>>,
    },
    Leave {
        user_id: String,
    },
    Command {
        user_id: String,
        timestamp_ms: i64,
        payload: CommandPayload,
        reply: oneshot::Sender<Result<(), ErrorCode>>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// A cheaply-cloneable reference to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    mailbox: mpsc::Sender<ActorMessage>,
}

/// Mailbox capacity: generous relative to the suggested 1024 per-recipient
/// egress capacity, since the mailbox is shared by every connection in
/// the session rather than being per-recipient.
const MAILBOX_CAPACITY: usize = 4096;

impl SessionHandle {
    pub async fn join(
        &self,
        user_id: String,
        display_name: String,
        timestamp_ms: i64,
        egress: EgressSender,
    ) -> Result<FullStateSync, ErrorCode> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .mailbox
            .send(ActorMessage::Join {
                user_id,
                display_name,
                timestamp_ms,
                egress,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return Err(ErrorCode::Internal);
        }
        reply_rx.await.unwrap_or(Err(ErrorCode::Internal))
    }

    pub async fn leave(&self, user_id: String) {
        let _ = self.mailbox.send(ActorMessage::Leave { user_id }).await;
    }

    pub async fn command(
        &self,
        user_id: String,
        timestamp_ms: i64,
        payload: CommandPayload,
    ) -> Result<(), ErrorCode> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .mailbox
            .send(ActorMessage::Command {
                user_id,
                timestamp_ms,
                payload,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return Err(ErrorCode::Internal);
        }
        reply_rx.await.unwrap_or(Err(ErrorCode::Internal))
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.mailbox.send(ActorMessage::Shutdown { ack: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

struct SessionActor {
    session_id: String,
    state: SessionState,
    log: EventLog,
    egress: HashMap<String, EgressSender>,
    session_user_cap: usize,
    metrics: Arc<Metrics>,
}

/// Spawn a new session actor task and return a handle to it. `initial_state`
/// and `log` are expected to already reflect any replayed history (recovery
/// boot) or to be freshly created (first join of a brand-new session).
pub fn spawn(
    session_id: String,
    log: EventLog,
    initial_state: SessionState,
    session_user_cap: usize,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let actor = SessionActor {
        session_id: session_id.clone(),
        state: initial_state,
        log,
        egress: HashMap::new(),
        session_user_cap,
        metrics,
    };
    tokio::spawn(actor.run(rx, shutdown));
    SessionHandle {
        session_id,
        mailbox: tx,
    }
}

impl SessionActor {
    async fn run(mut self, mut mailbox: mpsc::Receiver<ActorMessage>, shutdown: CancellationToken) {
        self.metrics.session_created();
        loop {
            tokio::select! {
                msg = mailbox.recv() => {
                    match msg {
                        Some(ActorMessage::Shutdown { ack }) => {
                            self.drain_and_close(&mut mailbox).await;
                            let _ = ack.send(());
                            break;
                        }
                        Some(msg) => self.handle(msg),
                        None => break,
                    }
                }
                _ = shutdown.cancelled() => {
                    self.drain_and_close(&mut mailbox).await;
                    break;
                }
            }
        }
        self.metrics.session_destroyed();
        info!(session_id = %self.session_id, "session actor stopped");
    }

    /// Drain any commands already queued, write a final snapshot, and
    /// close out — the graceful-shutdown contract from the concurrency
    /// model.
    async fn drain_and_close(&mut self, mailbox: &mut mpsc::Receiver<ActorMessage>) {
        while let Ok(msg) = mailbox.try_recv() {
            match msg {
                ActorMessage::Shutdown { ack } => {
                    let _ = ack.send(());
                }
                other => self.handle(other),
            }
        }
        if let Err(e) = self.log.snapshot(self.state.seq, &self.state) {
            warn!(session_id = %self.session_id, error = %e, "final snapshot failed");
        }
    }

    fn handle(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::Join {
                user_id,
                display_name,
                timestamp_ms,
                egress,
                reply,
            } => self.handle_join(user_id, display_name, timestamp_ms, egress, reply),
            ActorMessage::Leave { user_id } => self.handle_leave(user_id),
            ActorMessage::Command {
                user_id,
                timestamp_ms,
                payload,
                reply,
            } => self.handle_command(user_id, timestamp_ms, payload, reply),
            ActorMessage::Shutdown { ack } => {
                let _ = ack.send(());
            }
        }
    }

    fn handle_join(
        &mut self,
        user_id: String,
        display_name: String,
        timestamp_ms: i64,
        egress: EgressSender,
        reply: oneshot::Sender<Result<FullStateSync, ErrorCode>>,
    ) {
        if self.state.users.len() >= self.session_user_cap && !self.state.users.contains_key(&user_id) {
            let _ = reply.send(Err(ErrorCode::SessionFull));
            return;
        }
        let server_now = now_ms();
        let clamped = clamp_timestamp(timestamp_ms, server_now);
        let outcome = self
            .state
            .apply(Command::JoinSession {
                user_id: user_id.clone(),
                display_name,
                timestamp_ms: clamped,
            });
        let outcome = match outcome {
            Ok(o) => o,
            Err(code) => {
                let _ = reply.send(Err(code));
                return;
            }
        };
        let uid = user_id.clone();
        self.egress.insert(user_id, egress);
        let sync = FullStateSync {
            session_id: self.session_id.clone(),
            objects: self.state.objects.clone(),
            users: self.state.users.clone(),
        };
        let _ = reply.send(Ok(sync));
        self.fan_out(outcome, Some(&uid), clamped);
    }

    fn handle_leave(&mut self, user_id: String) {
        self.egress.remove(&user_id);
        if let Ok(outcome) = self.state.apply(Command::LeaveSession { user_id: user_id.clone() }) {
            self.fan_out(outcome, Some(&user_id), now_ms());
        }
    }

    fn handle_command(
        &mut self,
        user_id: String,
        timestamp_ms: i64,
        payload: CommandPayload,
        reply: oneshot::Sender<Result<(), ErrorCode>>,
    ) {
        self.metrics.message_in();
        if let CommandPayload::CreateObject(p) = &payload {
            if !p.properties.matches_kind(p.kind) {
                let _ = reply.send(Err(ErrorCode::Malformed));
                return;
            }
        }
        let received_at = now_ms();
        let clamped = clamp_timestamp(timestamp_ms, received_at);
        let command = to_state_command(payload, user_id.clone(), clamped);
        let is_transform = matches!(command, Command::UpdateTransform { .. });

        let outcome = match self.state.apply(command.clone()) {
            Ok(o) => o,
            Err(code) => {
                let _ = reply.send(Err(code));
                return;
            }
        };
        let _ = reply.send(Ok(()));

        if let Outcome::Broadcast { logged: true, .. } = &outcome {
            if let Some(payload) = to_log_payload(&command) {
                if let Err(e) = self.log.append(self.state.seq, payload, &self.state) {
                    warn!(session_id = %self.session_id, error = %e, "event log append failed, continuing in degraded-durability mode");
                }
            }
        }
        if is_transform {
            self.metrics.transform_update();
        }
        let (event_type, object_id) = command_audit_fields(&command);
        self.fan_out(outcome, Some(&user_id), received_at);
        debug!(
            event_type,
            session_id = %self.session_id,
            user_id,
            object_id = ?object_id,
            duration_us = (now_ms() - received_at) * 1000,
            "command handled"
        );
    }

    /// Fan out a broadcast to every recipient except `originator`, via
    /// each recipient's bounded egress queue. A recipient whose queue is
    /// full is dropped from the session entirely rather than allowed to
    /// stall the actor.
    fn fan_out(&mut self, outcome: Outcome, originator: Option<&str>, command_receive_ms: i64) {
        let Outcome::Broadcast { event, .. } = outcome else {
            return;
        };
        let message = to_server_message(event);
        let enqueue_started = now_ms();
        let mut overloaded = Vec::new();
        for (user_id, egress) in self.egress.iter() {
            if Some(user_id.as_str()) == originator {
                continue;
            }
            match egress.send(message.clone()) {
                Ok(()) => {
                    self.metrics.message_out();
                    self.metrics
                        .record_propagation_latency_us((enqueue_started - command_receive_ms) * 1000);
                }
                Err(egress::Full) => overloaded.push(user_id.clone()),
            }
        }
        for user_id in overloaded {
            warn!(session_id = %self.session_id, user_id, "egress queue overloaded, dropping recipient");
            if let Some(egress) = self.egress.remove(&user_id) {
                let _ = egress.send(ServerMessage::error(ErrorCode::Overloaded, "egress queue overloaded"));
                egress.close();
            }
            if let Ok(leave_outcome) = self.state.apply(Command::LeaveSession { user_id: user_id.clone() }) {
                // Recurse is unnecessary: the dropped user cannot itself be a
                // recipient of its own departure notice.
                if let Outcome::Broadcast { event, .. } = leave_outcome {
                    let message = to_server_message(event);
                    for (uid, egress) in self.egress.iter() {
                        if uid == &user_id {
                            continue;
                        }
                        let _ = egress.send(message.clone());
                    }
                }
            }
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// `(event_type, object_id)` for the structured per-command log line
/// (§4.G "structured event records"). `object_id` is `None` for the
/// commands that carry no object (there are none among the mutation
/// commands routed through `handle_command`, but `SelectObject`'s is
/// optional).
fn command_audit_fields(command: &Command) -> (&'static str, Option<Uuid>) {
    match command {
        Command::CreateObject { object_id, .. } => ("CREATE_OBJECT", Some(*object_id)),
        Command::DeleteObject { object_id, .. } => ("DELETE_OBJECT", Some(*object_id)),
        Command::UpdateTransform { object_id, .. } => ("UPDATE_TRANSFORM", Some(*object_id)),
        Command::UpdateProperties { object_id, .. } => ("UPDATE_PROPERTIES", Some(*object_id)),
        Command::UpdateName { object_id, .. } => ("UPDATE_NAME", Some(*object_id)),
        Command::SelectObject { object_id, .. } => ("SELECT_OBJECT", *object_id),
        Command::JoinSession { .. } => ("JOIN_SESSION", None),
        Command::LeaveSession { .. } => ("LEAVE_SESSION", None),
    }
}

fn to_state_command(payload: CommandPayload, user_id: String, timestamp_ms: i64) -> Command {
    match payload {
        CommandPayload::CreateObject(p) => Command::CreateObject {
            object_id: p.object_id,
            name: p.name,
            properties: p.properties,
            asset_id: p.asset_id,
            asset_library: p.asset_library,
            transform: p.transform,
            user_id,
            timestamp_ms,
        },
        CommandPayload::DeleteObject(p) => Command::DeleteObject {
            object_id: p.object_id,
            user_id,
        },
        CommandPayload::UpdateTransform(p) => Command::UpdateTransform {
            object_id: p.object_id,
            transform: p.transform,
            user_id,
            timestamp_ms,
        },
        CommandPayload::UpdateProperties(p) => Command::UpdateProperties {
            object_id: p.object_id,
            properties: p.properties,
            user_id,
            timestamp_ms,
        },
        CommandPayload::UpdateName(p) => Command::UpdateName {
            object_id: p.object_id,
            name: p.name,
            user_id,
            timestamp_ms,
        },
        CommandPayload::SelectObject(p) => Command::SelectObject {
            user_id,
            object_id: p.object_id,
        },
    }
}

fn to_log_payload(command: &Command) -> Option<EntryPayload> {
    match command {
        Command::CreateObject {
            object_id,
            name,
            properties,
            asset_id,
            asset_library,
            transform,
            user_id,
            timestamp_ms,
        } => Some(EntryPayload::CreateObject {
            object_id: *object_id,
            name: name.clone(),
            properties: properties.clone(),
            asset_id: asset_id.clone(),
            asset_library: asset_library.clone(),
            transform: *transform,
            user_id: user_id.clone(),
            timestamp_ms: *timestamp_ms,
        }),
        Command::DeleteObject { object_id, user_id } => Some(EntryPayload::DeleteObject {
            object_id: *object_id,
            user_id: user_id.clone(),
        }),
        Command::UpdateTransform {
            object_id,
            transform,
            user_id,
            timestamp_ms,
        } => Some(EntryPayload::UpdateTransform {
            object_id: *object_id,
            transform: *transform,
            user_id: user_id.clone(),
            timestamp_ms: *timestamp_ms,
        }),
        Command::UpdateProperties {
            object_id,
            properties,
            user_id,
            timestamp_ms,
        } => Some(EntryPayload::UpdateProperties {
            object_id: *object_id,
            properties: properties.clone(),
            user_id: user_id.clone(),
            timestamp_ms: *timestamp_ms,
        }),
        Command::UpdateName {
            object_id,
            name,
            user_id,
            timestamp_ms,
        } => Some(EntryPayload::UpdateName {
            object_id: *object_id,
            name: name.clone(),
            user_id: user_id.clone(),
            timestamp_ms: *timestamp_ms,
        }),
        Command::JoinSession { .. } | Command::LeaveSession { .. } | Command::SelectObject { .. } => None,
    }
}

fn to_server_message(event: ServerEvent) -> ServerMessage {
    match event {
        ServerEvent::ObjectCreated { object } => ServerMessage::ObjectCreated { object },
        ServerEvent::ObjectDeleted { object_id, deleted_by } => {
            ServerMessage::ObjectDeleted { object_id, deleted_by }
        }
        ServerEvent::TransformUpdated {
            object_id,
            transform,
            updated_by,
            timestamp,
        } => ServerMessage::TransformUpdated {
            object_id,
            transform,
            updated_by,
            timestamp,
        },
        ServerEvent::PropertiesUpdated {
            object_id,
            properties,
            updated_by,
            timestamp,
        } => ServerMessage::PropertiesUpdated {
            object_id,
            properties,
            updated_by,
            timestamp,
        },
        ServerEvent::NameUpdated {
            object_id,
            name,
            updated_by,
            timestamp,
        } => ServerMessage::NameUpdated {
            object_id,
            name,
            updated_by,
            timestamp,
        },
        ServerEvent::UserJoined {
            user_id,
            display_name,
            color,
        } => ServerMessage::UserJoined {
            user_id,
            display_name,
            color,
        },
        ServerEvent::UserLeft { user_id } => ServerMessage::UserLeft { user_id },
        ServerEvent::UserSelected { user_id, object_id } => {
            ServerMessage::UserSelected { user_id, object_id }
        }
    }
}

#[cfg(test)]
#[path = "actor_tests.rs"]
mod tests;
