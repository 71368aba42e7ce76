// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-connection egress queue with optional transform coalescing.
//!
//! A plain `tokio::sync::mpsc` channel cannot have an already-queued item
//! replaced in place, which the transform-coalescing optimization needs
//! (§4.C: replace an unsent `UPDATE_TRANSFORM` for the same object+source
//! rather than appending). So the queue is a small hand-rolled ring
//! guarded by a lock, with a `Notify` waking the single consumer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::transport::ws_msg::ServerMessage;

struct Inner {
    queue: Mutex<VecDeque<ServerMessage>>,
    capacity: usize,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

/// The producer half, held by the session actor.
#[derive(Clone)]
pub struct EgressSender {
    inner: Arc<Inner>,
}

/// The consumer half, held by the connection's write task.
pub struct EgressReceiver {
    inner: Arc<Inner>,
}

pub fn channel(capacity: usize) -> (EgressSender, EgressReceiver) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        capacity,
        notify: Notify::new(),
        closed: std::sync::atomic::AtomicBool::new(false),
    });
    (
        EgressSender {
            inner: inner.clone(),
        },
        EgressReceiver { inner },
    )
}

/// Returned when the queue is at capacity and coalescing did not apply;
/// the caller (the actor) drops this recipient's connection with
/// `OVERLOADED`.
#[derive(Debug)]
pub struct Full;

impl EgressSender {
    /// Push `message` onto the queue. If an unsent message with the same
    /// `coalesce_key` is already queued, it is replaced in place instead
    /// of appending (no capacity consumed, no fan-out order violated for
    /// any other object). Otherwise appends, returning `Err(Full)` if the
    /// queue is already at capacity.
    pub fn send(&self, message: ServerMessage) -> Result<(), Full> {
        let mut queue = self.inner.queue.lock();
        if let Some(key) = message.coalesce_key() {
            if let Some(slot) = queue
                .iter_mut()
                .rev()
                .find(|m| m.coalesce_key() == Some(key))
            {
                *slot = message;
                drop(queue);
                self.inner.notify.notify_one();
                return Ok(());
            }
        }
        if queue.len() >= self.inner.capacity {
            return Err(Full);
        }
        queue.push_back(message);
        drop(queue);
        self.inner.notify.notify_one();
        Ok(())
    }

    pub fn close(&self) {
        self.inner.closed.store(true, std::sync::atomic::Ordering::Release);
        self.inner.notify.notify_one();
    }
}

impl EgressReceiver {
    /// Wait for and pop the next queued message, or `None` once the
    /// sender has closed and the queue has drained.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        loop {
            {
                let mut queue = self.inner.queue.lock();
                if let Some(msg) = queue.pop_front() {
                    return Some(msg);
                }
                if self.inner.closed.load(std::sync::atomic::Ordering::Acquire) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}

#[cfg(test)]
#[path = "egress_tests.rs"]
mod tests;
