// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection Handler (component D): the per-connection task that speaks
//! the envelope protocol over one WebSocket, gates it against the joined
//! identity and a token-bucket rate limit, and drains the session's
//! egress queue back into the socket.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{RawQuery, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::warn;

use crate::actor::CommandPayload;
use crate::egress::{self, EgressReceiver};
use crate::error::ErrorCode;
use crate::transport::auth;
use crate::transport::state::Store;
use crate::transport::ws_msg::{self, ClientMessage, ServerMessage};

/// WebSocket upgrade handler. A `?token=` query parameter carries the
/// bearer token, since the upgrade request can't set an `Authorization`
/// header from a browser.
pub async fn ws_handler(
    State(state): State<Arc<Store>>,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let query = query.unwrap_or_default();
    if let Err(code) = auth::validate_ws_query(&query, state.config.auth_token.as_deref()) {
        let (status, body) = code.to_http_response("unauthorized");
        return (status, body).into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(state, socket))
        .into_response()
}

/// State held for a connection that has successfully joined a session.
struct Joined {
    user_id: String,
    handle: crate::actor::SessionHandle,
    egress: EgressReceiver,
}

/// Simple token bucket: `rate` tokens added per second, capacity `rate`.
struct RateLimiter {
    tokens: f64,
    rate: f64,
    last: Instant,
}

impl RateLimiter {
    fn new(rate: u32) -> Self {
        let rate = rate.max(1) as f64;
        Self {
            tokens: rate,
            rate,
            last: Instant::now(),
        }
    }

    fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.rate).min(self.rate);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Await the next queued message for a joined connection, or never
/// resolve while not yet joined — lets a single `select!` arm cover both
/// states without restructuring the loop on join/leave.
async fn recv_egress(joined: &mut Option<Joined>) -> Option<ServerMessage> {
    match joined {
        Some(j) => j.egress.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_connection(state: Arc<Store>, socket: WebSocket) {
    state.metrics.connection_opened();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut joined: Option<Joined> = None;
    let mut limiter = RateLimiter::new(state.config.message_rate_limit);
    let mut ping_tick = tokio::time::interval(state.config.ping_interval());
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let pong_timeout = state.config.pong_timeout();
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(f)) => f,
                    Some(Err(_)) | None => break,
                };
                match frame {
                    Message::Text(text) => {
                        if !handle_text_frame(&state, &text, &mut joined, &mut limiter, &mut ws_tx).await {
                            break;
                        }
                    }
                    Message::Pong(_) => last_pong = Instant::now(),
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Binary(_) => {}
                }
            }
            msg = recv_egress(&mut joined) => {
                match msg {
                    Some(msg) => {
                        if send_json(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Session dropped us (egress queue overloaded). The
                        // actor already sent an OVERLOADED error before
                        // closing the queue; just forget the join.
                        joined = None;
                    }
                }
            }
            _ = ping_tick.tick() => {
                if last_pong.elapsed() > state.config.ping_interval() + pong_timeout {
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(joined) = joined {
        joined.handle.leave(joined.user_id).await;
    }
    state.metrics.connection_closed();
}

/// Parse and dispatch one text frame. Returns `false` when the connection
/// should be closed (rate limit exceeded or the socket write failed).
async fn handle_text_frame(
    state: &Store,
    text: &str,
    joined: &mut Option<Joined>,
    limiter: &mut RateLimiter,
    ws_tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
) -> bool {
    if !limiter.allow() {
        let _ = send_json(ws_tx, &ServerMessage::error(ErrorCode::RateLimited, "message rate exceeded")).await;
        return false;
    }

    let (message, timestamp, source_user_id) = match ws_msg::parse_client_frame(text) {
        Ok(v) => v,
        Err(code) => {
            return send_json(ws_tx, &ServerMessage::error(code, "malformed frame")).await.is_ok();
        }
    };

    match message {
        ClientMessage::JoinSession(payload) => {
            if joined.is_some() {
                return send_json(ws_tx, &ServerMessage::error(ErrorCode::IdentityMismatch, "already joined")).await.is_ok();
            }
            match state.registry.join_or_create(&payload.session_id) {
                Ok(handle) => {
                    let (egress_tx, egress_rx) = egress::channel(state.config.egress_queue_capacity);
                    match handle.join(source_user_id.clone(), payload.display_name, timestamp, egress_tx).await {
                        Ok(sync) => {
                            let reply = ServerMessage::FullStateSync {
                                session_id: sync.session_id,
                                objects: sync.objects,
                                users: sync.users,
                            };
                            if send_json(ws_tx, &reply).await.is_err() {
                                return false;
                            }
                            *joined = Some(Joined {
                                user_id: source_user_id,
                                handle,
                                egress: egress_rx,
                            });
                        }
                        Err(code) => {
                            return send_json(ws_tx, &ServerMessage::error(code, "join rejected")).await.is_ok();
                        }
                    }
                }
                Err(code) => {
                    return send_json(ws_tx, &ServerMessage::error(code, "join rejected")).await.is_ok();
                }
            }
            true
        }

        ClientMessage::LeaveSession => {
            match joined.take() {
                Some(j) => {
                    j.handle.leave(j.user_id).await;
                    true
                }
                None => send_json(ws_tx, &ServerMessage::error(ErrorCode::NotJoined, "not joined")).await.is_ok(),
            }
        }

        other => {
            let Some(j) = joined.as_ref() else {
                return send_json(ws_tx, &ServerMessage::error(ErrorCode::NotJoined, "join a session first")).await.is_ok();
            };
            if source_user_id != j.user_id {
                return send_json(
                    ws_tx,
                    &ServerMessage::error(ErrorCode::IdentityMismatch, "source_user_id does not match joined identity"),
                )
                .await
                .is_ok();
            }
            let Some(payload) = to_command_payload(other) else {
                return true;
            };
            if let Err(code) = j.handle.command(j.user_id.clone(), timestamp, payload).await {
                return send_json(ws_tx, &ServerMessage::error(code, "command rejected")).await.is_ok();
            }
            true
        }
    }
}

fn to_command_payload(message: ClientMessage) -> Option<CommandPayload> {
    match message {
        ClientMessage::CreateObject(p) => Some(CommandPayload::CreateObject(p)),
        ClientMessage::DeleteObject(p) => Some(CommandPayload::DeleteObject(p)),
        ClientMessage::UpdateTransform(p) => Some(CommandPayload::UpdateTransform(p)),
        ClientMessage::UpdateProperties(p) => Some(CommandPayload::UpdateProperties(p)),
        ClientMessage::UpdateName(p) => Some(CommandPayload::UpdateName(p)),
        ClientMessage::SelectObject(p) => Some(CommandPayload::SelectObject(p)),
        ClientMessage::JoinSession(_) | ClientMessage::LeaveSession => {
            warn!("to_command_payload called with a non-mutation message");
            None
        }
    }
}

async fn send_json(
    tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let envelope = msg.clone().into_envelope(now_ms());
    let text = serde_json::to_string(&envelope).unwrap_or_default();
    tx.send(Message::Text(text.into())).await
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
