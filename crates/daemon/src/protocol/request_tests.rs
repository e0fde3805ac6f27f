// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::request::*;
use yare::parameterized;

#[test]
fn bare_verbs_parse() {
    assert_eq!(Command::parse("STATUS"), Ok(Command::Status));
    assert_eq!(Command::parse("VERSION"), Ok(Command::Version));
    assert_eq!(Command::parse("RESET"), Ok(Command::Reset));
    assert_eq!(Command::parse("SSH_DISCONNECT_ALL"), Ok(Command::SshDisconnectAll));
    assert_eq!(Command::parse("COMPANION_STATUS"), Ok(Command::CompanionStatus));
}

#[test]
fn connect_with_and_without_tag() {
    assert_eq!(
        Command::parse("SSH_CONNECT work"),
        Ok(Command::SshConnect { alias: "work".to_string(), tag: None })
    );
    assert_eq!(
        Command::parse("SSH_CONNECT work staging"),
        Ok(Command::SshConnect { alias: "work".to_string(), tag: Some("staging".to_string()) })
    );
    assert!(matches!(Command::parse("SSH_CONNECT"), Err(RequestError::Usage(_))));
}

#[test]
fn askpass_requires_alias_and_token() {
    assert_eq!(
        Command::parse("ASKPASS work tok123"),
        Ok(Command::Askpass { alias: "work".to_string(), token: "tok123".to_string() })
    );
    assert!(matches!(Command::parse("ASKPASS work"), Err(RequestError::Usage(_))));
}

#[parameterized(
    start = { "COMPANION_START work db" },
    stop = { "COMPANION_STOP work db" },
    restart = { "COMPANION_RESTART work db" },
)]
fn companion_verbs_take_alias_and_name(line: &str) {
    let command = Command::parse(line).unwrap();
    let (alias, name) = match command {
        Command::CompanionStart { alias, name }
        | Command::CompanionStop { alias, name }
        | Command::CompanionRestart { alias, name } => (alias, name),
        other => panic!("unexpected parse: {other:?}"),
    };
    assert_eq!(alias, "work");
    assert_eq!(name, "db");
}

#[test]
fn companion_attach_history_arguments() {
    assert_eq!(
        Command::parse("COMPANION_ATTACH work db"),
        Ok(Command::CompanionAttach {
            alias: "work".to_string(),
            name: "db".to_string(),
            history_lines: None,
            history: true,
        })
    );
    assert_eq!(
        Command::parse("COMPANION_ATTACH work db 50"),
        Ok(Command::CompanionAttach {
            alias: "work".to_string(),
            name: "db".to_string(),
            history_lines: Some(50),
            history: true,
        })
    );
    assert_eq!(
        Command::parse("COMPANION_ATTACH work db no_history"),
        Ok(Command::CompanionAttach {
            alias: "work".to_string(),
            name: "db".to_string(),
            history_lines: None,
            history: false,
        })
    );
}

#[test]
fn logs_and_attach_history_arguments() {
    assert_eq!(Command::parse("LOGS"), Ok(Command::Logs { count: None, history: true }));
    assert_eq!(Command::parse("LOGS 100"), Ok(Command::Logs { count: Some(100), history: true }));
    assert_eq!(
        Command::parse("ATTACH no_history"),
        Ok(Command::Attach { count: None, history: false })
    );
    assert!(matches!(Command::parse("LOGS lots"), Err(RequestError::Usage(_))));
}

#[test]
fn context_status_limit() {
    assert_eq!(Command::parse("CONTEXT_STATUS"), Ok(Command::ContextStatus { limit: None }));
    assert_eq!(
        Command::parse("CONTEXT_STATUS 5"),
        Ok(Command::ContextStatus { limit: Some(5) })
    );
}

#[test]
fn unknown_and_empty_lines() {
    assert!(matches!(Command::parse("FROBNICATE"), Err(RequestError::UnknownVerb(_))));
    assert_eq!(Command::parse("   "), Err(RequestError::Empty));
}

#[parameterized(
    askpass = { "ASKPASS work s3cret-token", "ASKPASS work ****" },
    companion_init = { "COMPANION_INIT work db s3cret", "COMPANION_INIT work db ****" },
    short_askpass = { "ASKPASS work", "ASKPASS work" },
    other = { "SSH_CONNECT work", "SSH_CONNECT work" },
)]
fn tokens_are_masked_for_logging(line: &str, expected: &str) {
    assert_eq!(masked(line), expected);
}
