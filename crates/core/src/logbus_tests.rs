// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn broadcast_reaches_subscriber_in_order() {
    let bus = LogBus::new(10);
    let mut sub = bus.subscribe();

    bus.broadcast("one");
    bus.broadcast("two");
    bus.broadcast("three");

    assert_eq!(sub.recv().await.as_deref(), Some("one"));
    assert_eq!(sub.recv().await.as_deref(), Some("two"));
    assert_eq!(sub.recv().await.as_deref(), Some("three"));
}

#[tokio::test]
async fn full_buffer_drops_lines_for_that_subscriber_only() {
    let bus = LogBus::new(2048);
    let mut stalled = bus.subscribe();

    // Overflow the delivery buffer (256) without draining. Broadcast must
    // not block; lines past the buffer are dropped for this subscriber.
    for i in 0..300 {
        bus.broadcast(&format!("line-{i}"));
    }

    let mut received = Vec::new();
    while let Some(line) = stalled.try_recv() {
        received.push(line);
    }
    assert_eq!(received.len(), 256);
    assert_eq!(received.first().map(String::as_str), Some("line-0"));
    assert_eq!(received.last().map(String::as_str), Some("line-255"));

    // A subscriber arriving later still sees the full history.
    let (_, lines) = bus.subscribe_with_history(2048);
    assert_eq!(lines.len(), 300);
}

#[test]
fn history_is_a_fifo_ring() {
    let bus = LogBus::new(3);
    for line in ["a", "b", "c", "d"] {
        bus.add_to_history(line);
    }
    let (_, lines) = bus.subscribe_with_history(10);
    assert_eq!(lines, vec!["b", "c", "d"]);
}

#[test]
fn subscribe_with_history_caps_at_requested_count() {
    let bus = LogBus::new(10);
    for i in 0..5 {
        bus.add_to_history(&format!("h{i}"));
    }
    let (_, lines) = bus.subscribe_with_history(2);
    assert_eq!(lines, vec!["h3", "h4"]);
}

#[tokio::test]
async fn history_snapshot_excludes_later_broadcasts() {
    let bus = LogBus::new(10);
    bus.broadcast("before");
    let (mut sub, lines) = bus.subscribe_with_history(10);
    bus.broadcast("after");

    assert_eq!(lines, vec!["before"]);
    assert_eq!(sub.recv().await.as_deref(), Some("after"));
}

#[tokio::test]
async fn add_to_history_does_not_fan_out() {
    let bus = LogBus::new(10);
    let mut sub = bus.subscribe();
    bus.add_to_history("replayed");
    bus.broadcast("live");
    assert_eq!(sub.recv().await.as_deref(), Some("live"));
}

#[tokio::test]
async fn unsubscribe_closes_channel_and_is_idempotent() {
    let bus = LogBus::new(10);
    let mut sub = bus.subscribe();
    let id = sub.id();

    bus.unsubscribe(id);
    bus.unsubscribe(id);

    assert_eq!(sub.recv().await, None);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn dropped_subscriber_is_pruned_on_broadcast() {
    let bus = LogBus::new(10);
    let sub = bus.subscribe();
    drop(sub);
    bus.broadcast("anyone there?");
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn zero_or_negative_capacity_normalises_to_default() {
    assert_eq!(LogBus::new(0).capacity(), DEFAULT_HISTORY);
    assert_eq!(LogBus::new(-7).capacity(), DEFAULT_HISTORY);
    assert_eq!(LogBus::new(32).capacity(), 32);
}

#[test]
fn clear_history_empties_the_ring() {
    let bus = LogBus::new(10);
    bus.broadcast("x");
    bus.broadcast("y");
    assert_eq!(bus.history_len(), 2);
    bus.clear_history();
    assert_eq!(bus.history_len(), 0);
}
