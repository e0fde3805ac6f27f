// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process log bus: a bounded ring of recent lines plus non-blocking
//! fan-out to subscribers.
//!
//! Attach sessions and readiness gates both consume companion output through
//! a `LogBus`. Broadcast must never block on a slow subscriber: delivery uses
//! `try_send` and simply drops the line for any subscriber whose buffer is
//! full. History replay from the wrapper protocol goes through
//! [`LogBus::add_to_history`], which fills the ring without fanning out.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Ring size used when the configured history is zero or negative.
pub const DEFAULT_HISTORY: usize = 500;

/// Per-subscriber delivery buffer. A subscriber that falls this many lines
/// behind starts losing lines (for itself only).
const SUBSCRIBER_BUFFER: usize = 256;

/// Handle returned by [`LogBus::subscribe`]. Receives broadcast lines until
/// the bus drops the sender (unsubscribe or bus drop).
pub struct BusSubscriber {
    id: u64,
    rx: mpsc::Receiver<String>,
}

impl BusSubscriber {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Await the next line. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

struct Inner {
    history: VecDeque<String>,
    capacity: usize,
    subscribers: Vec<(u64, mpsc::Sender<String>)>,
    next_id: u64,
}

/// Ring-buffered publish/subscribe bus for line-oriented output.
pub struct LogBus {
    inner: Mutex<Inner>,
}

impl LogBus {
    /// Create a bus holding up to `capacity` lines of history. Zero or
    /// negative capacities are normalised to [`DEFAULT_HISTORY`].
    pub fn new(capacity: i64) -> Self {
        let capacity = if capacity > 0 { capacity as usize } else { DEFAULT_HISTORY };
        Self {
            inner: Mutex::new(Inner {
                history: VecDeque::with_capacity(capacity.min(64)),
                capacity,
                subscribers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Subscribe without history.
    pub fn subscribe(&self) -> BusSubscriber {
        let (sub, _) = self.subscribe_inner(0);
        sub
    }

    /// Subscribe and atomically snapshot the most recent `n` history lines.
    ///
    /// The returned lines were all broadcast (or replayed) before the
    /// subscription; the channel only carries lines broadcast after it.
    pub fn subscribe_with_history(&self, n: usize) -> (BusSubscriber, Vec<String>) {
        self.subscribe_inner(n)
    }

    fn subscribe_inner(&self, n: usize) -> (BusSubscriber, Vec<String>) {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        inner.subscribers.push((id, tx));
        let take = n.min(inner.history.len());
        let skip = inner.history.len() - take;
        let lines = inner.history.iter().skip(skip).cloned().collect();
        (BusSubscriber { id, rx }, lines)
    }

    /// Remove a subscriber. Dropping the sender closes the channel; calling
    /// again with the same id is a no-op.
    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Append to history and fan out to all current subscribers.
    ///
    /// Never blocks: a subscriber whose buffer is full misses this line; a
    /// subscriber whose receiver is gone is pruned.
    pub fn broadcast(&self, line: &str) {
        let mut inner = self.inner.lock();
        push_history(&mut inner, line);
        inner.subscribers.retain(|(_, tx)| {
            !matches!(tx.try_send(line.to_string()), Err(mpsc::error::TrySendError::Closed(_)))
        });
    }

    /// Append to history only, with no fan-out.
    ///
    /// Used for wrapper history replay so re-attaching subscribers see the
    /// lines without duplicating them to already-connected ones.
    pub fn add_to_history(&self, line: &str) {
        let mut inner = self.inner.lock();
        push_history(&mut inner, line);
    }

    pub fn clear_history(&self) {
        self.inner.lock().history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

fn push_history(inner: &mut Inner, line: &str) {
    if inner.history.len() == inner.capacity {
        inner.history.pop_front();
    }
    inner.history.push_back(line.to_string());
}

#[cfg(test)]
#[path = "logbus_tests.rs"]
mod tests;
