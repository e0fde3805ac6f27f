// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::Utc;
use overseer_core::{TunnelRecord, TunnelState};

use super::*;

fn connected(seconds_ago: i64) -> TunnelRecord {
    let mut record = TunnelRecord::new("work", "work.example.com");
    record.state = TunnelState::Connected;
    record.pid = 1234;
    record.last_connected_time = Some(Utc::now() - chrono::Duration::seconds(seconds_ago));
    record
}

#[test]
fn fresh_connections_are_left_alone() {
    let grace = Duration::from_secs(60);
    assert!(!eligible(&connected(5), grace, Utc::now()));
    assert!(eligible(&connected(120), grace, Utc::now()));
}

#[test]
fn only_connected_tunnels_are_probed() {
    let grace = Duration::from_secs(0);
    for state in
        [TunnelState::Connecting, TunnelState::Disconnected, TunnelState::Reconnecting]
    {
        let mut record = connected(300);
        record.state = state;
        assert!(!eligible(&record, grace, Utc::now()), "{state} should be skipped");
    }
}

#[test]
fn never_connected_is_not_probed() {
    let mut record = connected(300);
    record.last_connected_time = None;
    assert!(!eligible(&record, Duration::from_secs(0), Utc::now()));
}

#[tokio::test]
async fn tcp_probe_hits_a_live_listener() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    assert!(tcp_probe(&addr.to_string()).await);
}

#[tokio::test]
async fn tcp_probe_fails_on_a_closed_port() {
    // Bind-then-drop to find a port with nothing listening.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    assert!(!tcp_probe(&addr.to_string()).await);
}
