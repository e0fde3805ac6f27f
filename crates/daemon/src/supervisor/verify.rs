// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection verification from the SSH child's diagnostic stream.
//!
//! The child runs with `-v`; its stderr narrates the handshake. We scan the
//! lines for an authentication marker followed by a session marker, map the
//! known failure strings to error kinds, and extract the remote address as a
//! by-product. EOF before a verdict means the child died during setup.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// Verification failure kinds, mapped from diagnostic output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("authentication failed")]
    AuthFailed,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("no route to host")]
    NoRoute,

    #[error("connection timed out")]
    Timeout,

    #[error("could not resolve hostname")]
    UnresolvedHost,

    #[error("host key verification failed")]
    HostKeyRejected,

    #[error("too many authentication failures")]
    TooManyAuthFailures,

    #[error("SSH process terminated unexpectedly")]
    ChildExited,

    #[error("failed to read diagnostic output: {0}")]
    Io(String),
}

/// Facts extracted from a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerifiedInfo {
    /// `addr:port` from the "Authenticated to" line, or the last
    /// "Authenticating to host:port" as a fallback (jump-host handshakes
    /// omit the address).
    pub resolved_host: Option<String>,
}

/// Read diagnostic lines until the handshake succeeds or fails.
///
/// Success is "Entering interactive session" (or OpenBSD's "pledge:
/// network") after an authentication marker. Every call path out of this
/// function carries a verdict: the caller never has to guess.
pub async fn verify_connection<R>(lines: &mut Lines<R>) -> Result<VerifiedInfo, ConnectError>
where
    R: AsyncBufRead + Unpin,
{
    let mut authenticated = false;
    let mut resolved_host: Option<String> = None;
    let mut last_target: Option<String> = None;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Err(ConnectError::ChildExited),
            Err(e) => return Err(ConnectError::Io(e.to_string())),
        };

        if let Some(target) = parse_authenticating_to(&line) {
            last_target = Some(target);
        }
        if line.contains("Authenticated to") {
            authenticated = true;
            if resolved_host.is_none() {
                resolved_host = parse_authenticated_addr(&line);
            }
        } else if line.contains("Authentication succeeded") {
            authenticated = true;
        }

        if authenticated
            && (line.contains("Entering interactive session") || line.contains("pledge: network"))
        {
            return Ok(VerifiedInfo { resolved_host: resolved_host.or(last_target) });
        }

        if let Some(err) = classify_failure(&line) {
            return Err(err);
        }
    }
}

fn classify_failure(line: &str) -> Option<ConnectError> {
    if line.contains("Too many authentication failures") {
        Some(ConnectError::TooManyAuthFailures)
    } else if line.contains("Permission denied") {
        Some(ConnectError::AuthFailed)
    } else if line.contains("Connection refused") {
        Some(ConnectError::ConnectionRefused)
    } else if line.contains("No route to host") {
        Some(ConnectError::NoRoute)
    } else if line.contains("Connection timed out") {
        Some(ConnectError::Timeout)
    } else if line.contains("Could not resolve hostname") {
        Some(ConnectError::UnresolvedHost)
    } else if line.contains("Host key verification failed") {
        Some(ConnectError::HostKeyRejected)
    } else {
        None
    }
}

/// `debug1: Authenticated to myhost ([1.2.3.4]:22).` → `1.2.3.4:22`
///
/// Jump-host lines read `Authenticated to myhost (via jump)` and yield
/// nothing; the caller falls back to the last "Authenticating to" target.
fn parse_authenticated_addr(line: &str) -> Option<String> {
    let open = line.find("([")?;
    let rest = &line[open + 2..];
    let close = rest.find(']')?;
    let addr = &rest[..close];
    let after = &rest[close + 1..];
    let port: String = after
        .strip_prefix(':')?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if addr.is_empty() || port.is_empty() {
        return None;
    }
    Some(format!("{addr}:{port}"))
}

/// `debug1: Authenticating to myhost:22 as 'user'` → `myhost:22`
fn parse_authenticating_to(line: &str) -> Option<String> {
    let idx = line.find("Authenticating to ")?;
    let rest = &line[idx + "Authenticating to ".len()..];
    let target = rest.split_whitespace().next()?;
    let target = target.trim_end_matches('.');
    if target.contains(':') { Some(target.to_string()) } else { None }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
