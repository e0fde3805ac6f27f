// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tempfile::TempDir;

use crate::protocol::{Response, Status};
use crate::wrapper::send_command;

use super::*;

async fn started(dir: &TempDir) -> DaemonState {
    startup(dir.path()).await.expect("startup")
}

#[tokio::test]
async fn startup_writes_pid_file_and_binds_socket() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    let pid_path = dir.path().join("overseerd.pid");
    let socket_path = dir.path().join("overseerd.sock");
    assert!(socket_path.exists());
    let pid: u32 = std::fs::read_to_string(&pid_path).unwrap().trim().parse().unwrap();
    assert_eq!(pid, std::process::id());

    daemon.shutdown().await;
    assert!(!socket_path.exists());
    assert!(!pid_path.exists());
}

#[tokio::test]
async fn second_daemon_fails_to_lock() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    match startup(dir.path()).await {
        Err(LifecycleError::LockFailed(_)) => {}
        other => panic!("expected LockFailed, got {:?}", other.map(|_| ())),
    }

    // The loser must not have wiped the winner's PID.
    let pid: u32 = std::fs::read_to_string(dir.path().join("overseerd.pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());

    daemon.shutdown().await;
}

#[tokio::test]
async fn adoption_with_dead_pid_adopts_nothing_and_removes_the_file() {
    let dir = TempDir::new().unwrap();

    let mut record = overseer_core::TunnelRecord::new("x", "x.example.com");
    record.pid = 999_999_999;
    record.state = overseer_core::TunnelState::Connected;
    overseer_storage::save_tunnel_state(dir.path(), &[record]).unwrap();

    let daemon = started(&dir).await;
    assert!(daemon.ctx.supervisor.is_empty());
    assert!(!dir.path().join(overseer_storage::TUNNEL_STATE_FILE).exists());

    daemon.shutdown().await;
}

#[tokio::test]
async fn unusable_sensor_cache_is_skipped() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(overseer_storage::SENSOR_STATE_FILE),
        r#"{"version":"99","timestamp":"2026-01-01T00:00:00Z","sensors":[]}"#,
    )
    .unwrap();

    let daemon = started(&dir).await;
    daemon.shutdown().await;
}

#[tokio::test]
async fn status_over_the_socket_streams_message_then_data() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    let responses =
        send_command(&dir.path().join("overseerd.sock"), "STATUS").await.unwrap();
    assert_eq!(responses.len(), 2);
    assert!(matches!(
        &responses[0],
        Response::Message { status: Status::Info, message } if message.contains("0 tunnel")
    ));
    assert!(matches!(
        &responses[1],
        Response::Data { data } if data["tunnels"].as_array().unwrap().is_empty()
    ));

    daemon.shutdown().await;
}

#[tokio::test]
async fn version_reports_package_version() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    let responses =
        send_command(&dir.path().join("overseerd.sock"), "VERSION").await.unwrap();
    assert!(matches!(
        &responses[0],
        Response::Message { message, .. } if message.contains(env!("CARGO_PKG_VERSION"))
    ));

    daemon.shutdown().await;
}

#[tokio::test]
async fn askpass_with_unknown_token_is_an_error() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    let responses =
        send_command(&dir.path().join("overseerd.sock"), "ASKPASS work nope").await.unwrap();
    assert!(responses[0].is_error());

    daemon.shutdown().await;
}

#[tokio::test]
async fn companion_init_with_unknown_token_is_an_error() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    let responses =
        send_command(&dir.path().join("overseerd.sock"), "COMPANION_INIT work db nope")
            .await
            .unwrap();
    assert!(responses[0].is_error());

    daemon.shutdown().await;
}

#[tokio::test]
async fn unknown_verbs_are_rejected_on_the_wire() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    let responses =
        send_command(&dir.path().join("overseerd.sock"), "FROBNICATE now").await.unwrap();
    assert!(responses[0].is_error());

    daemon.shutdown().await;
}

#[tokio::test]
async fn disconnect_of_unknown_tunnel_errors_and_saves_state() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    let responses =
        send_command(&dir.path().join("overseerd.sock"), "SSH_DISCONNECT ghost").await.unwrap();
    assert!(responses[0].is_error());
    // Mutating verbs persist snapshots even when they fail.
    assert!(dir.path().join(overseer_storage::TUNNEL_STATE_FILE).exists());

    daemon.shutdown().await;
}

#[tokio::test]
async fn logs_returns_recent_daemon_events() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;

    daemon.ctx.daemon_bus.broadcast("2026-01-01T00:00:00Z [work] connected");
    let responses =
        send_command(&dir.path().join("overseerd.sock"), "LOGS").await.unwrap();
    assert!(matches!(
        &responses[0],
        Response::Message { message, .. } if message.contains("[work] connected")
    ));

    daemon.shutdown().await;
}

/// Put a fake `ssh` first on PATH. The script prints scripted diagnostics
/// on stderr and then blocks (success case) or exits (failure case).
fn install_fake_ssh(dir: &TempDir, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let path = bin.join("ssh");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    let old_path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{old_path}", bin.display()));
}

const FAKE_SSH_OK: &str = r#"#!/bin/sh
echo "debug1: Authenticated to myhost ([1.2.3.4]:22)." >&2
echo "debug1: Entering interactive session." >&2
exec sleep 600
"#;

const FAKE_SSH_DENIED: &str = r#"#!/bin/sh
echo "debug1: Trying private key: /home/u/.ssh/id_ed25519" >&2
echo "debug1: Permission denied (publickey)." >&2
exit 255
"#;

#[tokio::test]
#[serial_test::serial]
async fn connect_success_verifies_and_resolves_the_host() {
    let dir = TempDir::new().unwrap();
    install_fake_ssh(&dir, FAKE_SSH_OK);
    let daemon = started(&dir).await;
    let socket = dir.path().join("overseerd.sock");

    let responses = send_command(&socket, "SSH_CONNECT myhost").await.unwrap();
    assert_eq!(responses.len(), 1, "exactly one message expected: {responses:?}");
    assert!(matches!(
        &responses[0],
        Response::Message { status: Status::Info, message }
            if message.contains("myhost connected") && message.contains("1.2.3.4:22")
    ));

    let records = daemon.ctx.supervisor.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, overseer_core::TunnelState::Connected);
    assert_eq!(records[0].resolved_host.as_deref(), Some("1.2.3.4:22"));
    assert!(records[0].pid > 0);

    // The mutating command snapshotted a now-adoptable entry.
    let saved = overseer_storage::load_tunnel_state(dir.path()).unwrap().unwrap();
    assert_eq!(saved.tunnels.len(), 1);

    // A second connect is rejected while the first is live.
    let responses = send_command(&socket, "SSH_CONNECT myhost").await.unwrap();
    assert!(matches!(
        &responses[0],
        Response::Message { status: Status::Warn, message } if message.contains("already running")
    ));

    let responses = send_command(&socket, "SSH_DISCONNECT myhost").await.unwrap();
    assert!(responses.iter().any(|r| matches!(
        r,
        Response::Message { status: Status::Info, message } if message.contains("disconnected")
    )));
    assert!(daemon.ctx.supervisor.is_empty());

    daemon.shutdown().await;
}

#[tokio::test]
#[serial_test::serial]
async fn auth_rejection_leaves_no_tunnel_behind() {
    let dir = TempDir::new().unwrap();
    install_fake_ssh(&dir, FAKE_SSH_DENIED);
    let daemon = started(&dir).await;

    let responses =
        send_command(&dir.path().join("overseerd.sock"), "SSH_CONNECT denied").await.unwrap();
    assert_eq!(responses.len(), 1);
    assert!(matches!(
        &responses[0],
        Response::Message { status: Status::Error, message }
            if message.contains("authentication failed")
    ));
    assert!(daemon.ctx.supervisor.is_empty());

    daemon.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let daemon = started(&dir).await;
    daemon.shutdown().await;
    daemon.shutdown().await;
}
