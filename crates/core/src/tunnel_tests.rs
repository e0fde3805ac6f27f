// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn state_round_trips_through_serde() {
    for state in [
        TunnelState::Connecting,
        TunnelState::Connected,
        TunnelState::Disconnected,
        TunnelState::Reconnecting,
    ] {
        let json = serde_json::to_string(&state).unwrap();
        let back: TunnelState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}

#[test]
fn state_serializes_as_lowercase_string() {
    let json = serde_json::to_string(&TunnelState::Reconnecting).unwrap();
    assert_eq!(json, "\"reconnecting\"");
}

#[test]
fn only_connected_is_runnable() {
    assert!(TunnelState::Connected.is_runnable());
    assert!(!TunnelState::Connecting.is_runnable());
    assert!(!TunnelState::Disconnected.is_runnable());
    assert!(!TunnelState::Reconnecting.is_runnable());
}

#[test]
fn new_record_has_zero_counters() {
    let record = TunnelRecord::new("work", "work.example.com");
    assert_eq!(record.pid, 0);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.total_reconnects, 0);
    assert_eq!(record.state, TunnelState::Connecting);
    assert!(record.auto_reconnect);
    assert!(record.resolved_host.is_none());
}

#[test]
fn record_round_trips_through_serde() {
    let mut record = TunnelRecord::new("work", "work.example.com");
    record.pid = 4242;
    record.state = TunnelState::Connected;
    record.resolved_host = Some("10.0.0.1:22".to_string());
    record.jump_chain = vec!["bastion".to_string()];
    record.environment.insert("FOO".to_string(), "bar".to_string());
    record.total_reconnects = 3;

    let json = serde_json::to_string(&record).unwrap();
    let back: TunnelRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record, back);
}
