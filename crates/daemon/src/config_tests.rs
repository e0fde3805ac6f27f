// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use overseer_core::{OnFailure, StopSignal, WaitMode};
use tempfile::TempDir;

use super::*;

fn load_toml(text: &str) -> Result<Settings, ConfigError> {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), text).unwrap();
    Settings::load(dir.path())
}

#[test]
fn missing_file_yields_empty_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load(dir.path()).unwrap();
    assert!(settings.tunnels.is_empty());
    assert!(!settings.auto_exit);
    assert_eq!(settings.health_check_interval, Duration::from_secs(60));
    assert_eq!(settings.socket_path, dir.path().join("overseerd.sock"));
    assert_eq!(settings.pid_path, dir.path().join("overseerd.pid"));
}

#[test]
fn malformed_toml_is_invalid() {
    assert!(matches!(load_toml("tunnels = ["), Err(ConfigError::Invalid(_))));
}

#[test]
fn full_tunnel_section_resolves() {
    let settings = load_toml(
        r#"
        [daemon]
        auto_exit = true
        health_check_interval = "30s"

        [backoff]
        initial = "2s"
        max = "1m"
        factor = 3.0

        [tunnels.work]
        hostname = "work.example.com"
        auto_reconnect = false
        max_retries = 3
        jump_chain = ["bastion"]
        secret = "hunter2"
        on_connect = "notify-send connected"

        [tunnels.work.environment]
        HTTP_PROXY = "http://proxy:3128"

        [[tunnels.work.companions]]
        name = "db"
        command = "pg_ctl start"
        wait_mode = "string"
        wait_for = "ready to accept"
        timeout = "10s"
        ready_delay = "500ms"
        keep_alive = true
        auto_restart = true
        persistent = true
        run_before = true
        on_failure = "continue"
        stop_signal = "TERM"
        "#,
    )
    .unwrap();

    assert!(settings.auto_exit);
    assert_eq!(settings.health_check_interval, Duration::from_secs(30));
    assert_eq!(settings.backoff.delay(1), Duration::from_secs(6));

    let work = &settings.tunnels["work"];
    assert_eq!(work.hostname, "work.example.com");
    assert!(!work.auto_reconnect);
    assert_eq!(work.max_retries, 3);
    assert_eq!(work.jump_chain, vec!["bastion"]);
    assert_eq!(work.secret.as_deref(), Some("hunter2"));
    assert_eq!(work.environment["HTTP_PROXY"], "http://proxy:3128");

    let db = &work.companions[0];
    assert_eq!(db.name, "db");
    assert_eq!(db.wait_mode, WaitMode::String);
    assert_eq!(db.wait_for.as_deref(), Some("ready to accept"));
    assert_eq!(db.timeout, Duration::from_secs(10));
    assert_eq!(db.ready_delay, Duration::from_millis(500));
    assert_eq!(db.on_failure, OnFailure::Continue);
    assert_eq!(db.stop_signal, StopSignal::Term);
    assert!(db.keep_alive && db.auto_restart && db.persistent && db.run_before);
}

#[test]
fn alias_doubles_as_hostname() {
    let settings = load_toml("[tunnels.shortcut]\n").unwrap();
    assert_eq!(settings.tunnels["shortcut"].hostname, "shortcut");
    assert!(settings.tunnels["shortcut"].auto_reconnect);
    assert_eq!(settings.tunnels["shortcut"].max_retries, 10);
}

#[test]
fn companion_without_name_is_rejected() {
    let err = load_toml(
        r#"
        [[tunnels.work.companions]]
        command = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Tunnel { .. }));
}

#[test]
fn string_wait_mode_requires_wait_for() {
    let err = load_toml(
        r#"
        [[tunnels.work.companions]]
        name = "db"
        command = "true"
        wait_mode = "string"
        "#,
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("wait_for"), "unexpected error: {message}");
}

#[test]
fn unknown_enum_values_are_rejected() {
    for (key, value) in
        [("wait_mode", "regex"), ("on_failure", "retry"), ("stop_signal", "KILL9")]
    {
        let toml = format!(
            "[[tunnels.work.companions]]\nname = \"c\"\ncommand = \"true\"\n{key} = \"{value}\"\n"
        );
        assert!(load_toml(&toml).is_err(), "{key}={value} should be rejected");
    }
}

#[test]
fn unparsable_durations_fall_back() {
    let settings = load_toml(
        r#"
        [daemon]
        health_check_interval = "whenever"

        [[tunnels.work.companions]]
        name = "c"
        command = "true"
        timeout = "eventually"
        "#,
    )
    .unwrap();
    assert_eq!(settings.health_check_interval, Duration::from_secs(60));
    assert_eq!(settings.tunnels["work"].companions[0].timeout, Duration::from_secs(30));
}

#[test]
fn context_rules_resolve_and_skip_incomplete() {
    let settings = load_toml(
        r#"
        [[context.rules]]
        location = "office"
        connect = ["work"]

        [[context.rules]]
        disconnect = ["work"]
        "#,
    )
    .unwrap();
    assert_eq!(
        settings.context_rules,
        vec![ContextRule {
            location: "office".to_string(),
            connect: vec!["work".to_string()],
            disconnect: vec![],
        }]
    );
}

#[test]
fn bad_backoff_falls_back_to_defaults() {
    let settings = load_toml("[backoff]\ninitial = \"fast\"\n").unwrap();
    assert_eq!(settings.backoff.delay(0), Duration::from_secs(1));
    assert_eq!(settings.backoff.delay(100), Duration::from_secs(300));
}
