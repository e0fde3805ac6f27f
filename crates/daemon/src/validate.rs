// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process validation for adoption.
//!
//! PID reuse across daemon restarts is real: a state file may name a PID that
//! now belongs to an unrelated process. Before claiming a child from a
//! previous generation, probe that the PID is alive and that its observed
//! command line still contains the tokens we launched it with.

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::debug;

/// Null-signal probe: true iff the PID exists and is signalable by us.
pub fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Verify that `pid` still names the child we expect for `alias`.
///
/// Two steps: a null-signal probe, then a containment check of the expected
/// command-line tokens against the platform's view of the process.
pub fn validate(pid: i32, expected_cmdline: &[String], alias: &str) -> bool {
    if !pid_alive(pid) {
        debug!(alias, pid, "validation failed: pid not alive");
        return false;
    }

    let actual = match read_cmdline(pid) {
        Some(actual) => actual,
        None => {
            debug!(alias, pid, "validation failed: no command line");
            return false;
        }
    };

    let ok = matches_cmdline(&actual, expected_cmdline);
    if !ok {
        debug!(alias, pid, actual, "validation failed: command line mismatch");
    }
    ok
}

/// Containment check, case-sensitive substring semantics.
///
/// Every expected token must appear in the actual command line, except:
/// the executable token (first) is matched by basename, so a binary that
/// moved between generations still validates; verbosity flags are launch
/// noise and skipped entirely. An empty actual command line never matches.
pub fn matches_cmdline(actual: &str, expected: &[String]) -> bool {
    if actual.is_empty() {
        return false;
    }
    for (idx, token) in expected.iter().enumerate() {
        if token == "-v" {
            continue;
        }
        let needle = if idx == 0 { basename(token) } else { token.as_str() };
        if !actual.contains(needle) {
            return false;
        }
    }
    true
}

fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

/// Read the process's command line as a single space-separated string.
#[cfg(target_os = "linux")]
fn read_cmdline(pid: i32) -> Option<String> {
    let bytes = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    let text: String = bytes
        .iter()
        .map(|&b| if b == 0 { ' ' } else { b as char })
        .collect();
    let text = text.trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(target_os = "macos")]
fn read_cmdline(pid: i32) -> Option<String> {
    let output = std::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "command="])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn read_cmdline(_pid: i32) -> Option<String> {
    None
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
