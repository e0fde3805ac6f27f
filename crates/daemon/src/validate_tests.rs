// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn tokens(words: &[&str]) -> Vec<String> {
    words.iter().map(|s| s.to_string()).collect()
}

#[test]
fn verbosity_flag_is_skipped() {
    assert!(matches_cmdline("ssh host -N -o X", &tokens(&["ssh", "host", "-N", "-v"])));
}

#[test]
fn different_executable_is_rejected() {
    assert!(!matches_cmdline("scp host", &tokens(&["ssh", "host"])));
}

#[test]
fn path_qualified_executable_matches_by_basename() {
    assert!(matches_cmdline("/usr/bin/ssh host -N", &tokens(&["ssh", "host"])));
    assert!(matches_cmdline("ssh host -N", &tokens(&["/opt/local/bin/ssh", "host"])));
}

#[test]
fn empty_actual_never_matches() {
    assert!(!matches_cmdline("", &tokens(&["ssh"])));
    assert!(!matches_cmdline("", &[]));
}

#[test]
fn missing_token_is_rejected() {
    assert!(!matches_cmdline("ssh host", &tokens(&["ssh", "host", "-N"])));
}

#[test]
fn matching_is_case_sensitive() {
    assert!(!matches_cmdline("ssh HOST", &tokens(&["ssh", "host"])));
}

#[test]
fn own_pid_is_alive() {
    assert!(pid_alive(std::process::id() as i32));
}

#[test]
fn absurd_pid_is_dead() {
    assert!(!pid_alive(999_999_999));
    assert!(!pid_alive(0));
    assert!(!pid_alive(-4));
}

#[cfg(target_os = "linux")]
#[test]
fn validates_own_process_by_cmdline() {
    let pid = std::process::id() as i32;
    let actual = std::fs::read_to_string(format!("/proc/{pid}/cmdline")).unwrap();
    let exe = actual.split('\0').next().unwrap().to_string();

    assert!(validate(pid, &[exe], "self"));
    assert!(!validate(pid, &tokens(&["no-such-binary-xyz"]), "self"));
}

#[test]
fn dead_pid_fails_validation_even_with_empty_expectation() {
    assert!(!validate(999_999_999, &[], "ghost"));
}
