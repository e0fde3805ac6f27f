// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use overseer_core::{EventLogger, TokenRegistrar, TunnelRecord, TunnelState};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::askpass::TokenTables;
use crate::companion::CompanionManager;
use crate::config::Settings;
use crate::protocol::{Response, Status};

use super::*;

struct NullLogger;

impl EventLogger for NullLogger {
    fn append(&self, _alias: &str, _kind: &str, _details: &str) {}
}

struct Fixture {
    supervisor: Supervisor,
    #[allow(dead_code)]
    ip_known_tx: watch::Sender<bool>,
    #[allow(dead_code)]
    auto_exit: Arc<Notify>,
}

fn fixture() -> Fixture {
    let settings = Arc::new(RwLock::new(
        Settings::load(&std::env::temp_dir().join("overseer-no-such-config")).unwrap(),
    ));
    let tokens = Arc::new(TokenTables::new());
    let events: Arc<dyn EventLogger> = Arc::new(NullLogger);
    let root = CancellationToken::new();
    let companions = Arc::new(CompanionManager::new(
        Arc::clone(&settings),
        Arc::clone(&tokens) as Arc<dyn TokenRegistrar>,
        Arc::clone(&events),
        root.clone(),
    ));
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(ConfigCredentials::new(Arc::clone(&settings)));
    let (ip_known_tx, ip_known) = watch::channel(true);
    let auto_exit = Arc::new(Notify::new());

    let supervisor = Supervisor::new(
        settings,
        tokens,
        companions,
        credentials,
        events,
        Arc::new(RwLock::new(HashMap::new())),
        ip_known,
        Arc::clone(&auto_exit),
        root,
    );
    Fixture { supervisor, ip_known_tx, auto_exit }
}

fn progress() -> (mpsc::Sender<Response>, mpsc::Receiver<Response>) {
    mpsc::channel(64)
}

async fn collect(rx: &mut mpsc::Receiver<Response>) -> Vec<Response> {
    let mut responses = Vec::new();
    while let Ok(response) = rx.try_recv() {
        responses.push(response);
    }
    responses
}

fn connected_record(alias: &str, pid: i32) -> TunnelRecord {
    let mut record = TunnelRecord::new(alias, format!("{alias}.example.com"));
    record.pid = pid;
    record.state = TunnelState::Connected;
    record
}

#[tokio::test]
async fn adoption_rejects_a_dead_pid() {
    let fx = fixture();
    assert!(!fx.supervisor.adopt_tunnel(connected_record("x", 999_999_999)));
    assert!(fx.supervisor.is_empty());
}

#[tokio::test]
async fn adoption_rejects_an_alive_pid_with_foreign_cmdline() {
    let fx = fixture();
    // Our own PID is alive, but its command line is no SSH invocation.
    let record = connected_record("x", std::process::id() as i32);
    assert!(!fx.supervisor.adopt_tunnel(record));
    assert!(fx.supervisor.is_empty());
}

#[tokio::test]
async fn stop_of_unknown_tunnel_reports_not_running() {
    let fx = fixture();
    let (tx, mut rx) = progress();
    assert!(!fx.supervisor.stop_tunnel("ghost", false, &tx).await);
    let responses = collect(&mut rx).await;
    assert_eq!(responses.len(), 1);
    assert!(responses[0].is_error());
}

#[tokio::test]
async fn connecting_entry_rejects_a_second_connect() {
    let fx = fixture();
    let mut record = TunnelRecord::new("work", "work.example.com");
    record.state = TunnelState::Connecting;
    fx.supervisor.insert_test_entry(record);

    let (tx, mut rx) = progress();
    assert!(!fx.supervisor.start_tunnel("work", None, &tx).await);
    let responses = collect(&mut rx).await;
    assert!(matches!(
        responses.first(),
        Some(Response::Message { status: Status::Warn, message }) if message.contains("already running")
    ));

    // Still exactly one entry for the alias.
    assert_eq!(fx.supervisor.records().len(), 1);
}

#[tokio::test]
async fn reset_retries_clears_counters_for_every_tunnel() {
    let fx = fixture();
    for alias in ["a", "b"] {
        let mut record = connected_record(alias, 0);
        record.state = TunnelState::Reconnecting;
        record.retry_count = 7;
        record.next_retry_time = Some(chrono::Utc::now());
        fx.supervisor.insert_test_entry(record);
    }

    fx.supervisor.reset_retries();
    for record in fx.supervisor.records() {
        assert_eq!(record.retry_count, 0);
        assert!(record.next_retry_time.is_none());
    }
}

#[tokio::test]
async fn records_are_sorted_by_alias() {
    let fx = fixture();
    for alias in ["zulu", "alpha", "mike"] {
        fx.supervisor.insert_test_entry(TunnelRecord::new(alias, alias));
    }
    let aliases: Vec<String> = fx.supervisor.records().into_iter().map(|r| r.alias).collect();
    assert_eq!(aliases, vec!["alpha", "mike", "zulu"]);
}

#[tokio::test]
async fn health_bookkeeping_counts_and_resets() {
    let fx = fixture();
    fx.supervisor.insert_test_entry(connected_record("work", 0));

    assert_eq!(fx.supervisor.note_health("work", false), 1);
    assert_eq!(fx.supervisor.note_health("work", false), 2);
    assert_eq!(fx.supervisor.note_health("work", true), 0);
    assert_eq!(fx.supervisor.note_health("ghost", false), 0);
}

#[tokio::test]
async fn status_data_embeds_records() {
    let fx = fixture();
    fx.supervisor.insert_test_entry(connected_record("work", 42));
    let data = fx.supervisor.status_data();
    assert_eq!(data["tunnels"][0]["alias"], "work");
    assert_eq!(data["tunnels"][0]["pid"], 42);
    assert_eq!(data["tunnels"][0]["state"], "connected");
}

#[tokio::test]
async fn config_credentials_read_the_tunnel_secret() {
    let settings = Arc::new(RwLock::new(
        Settings::load(&std::env::temp_dir().join("overseer-no-such-config")).unwrap(),
    ));
    let credentials = ConfigCredentials::new(Arc::clone(&settings));
    assert!(credentials.lookup("work").is_none());

    settings.write().tunnels.insert(
        "work".to_string(),
        crate::config::TunnelSettings {
            hostname: "work.example.com".to_string(),
            auto_reconnect: true,
            max_retries: 10,
            jump_chain: Vec::new(),
            environment: HashMap::new(),
            secret: Some("hunter2".to_string()),
            on_connect: None,
            on_disconnect: None,
            companions: Vec::new(),
        },
    );
    assert_eq!(credentials.lookup("work").as_deref(), Some("hunter2"));
}

#[tokio::test]
async fn expected_cmdline_names_ssh_and_host() {
    let record = TunnelRecord::new("work", "work.example.com");
    let tokens = expected_cmdline(&record);
    assert_eq!(tokens, vec!["ssh", "-N", "work.example.com"]);
}
