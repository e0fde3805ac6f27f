// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-reinvocation modes of the daemon binary.
//!
//! `companion-wrap` executes a companion's command line and streams its
//! output back over the per-companion socket, keeping a bounded replay
//! buffer so it can survive a daemon restart: on every (re)connect it sends
//! the buffer inside a `HISTORY_START`/`HISTORY_END` block, then live lines.
//!
//! `askpass` is the credential helper SSH invokes: it presents its one-shot
//! token over the main IPC socket and prints the returned secret.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::env::{
    self, ENV_ALIAS, ENV_COMPANION_ALIAS, ENV_COMPANION_NAME, ENV_COMPANION_TOKEN, ENV_TOKEN,
};
use crate::protocol::{Response, Status};

const REPLAY_BUFFER: usize = 500;
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Run a companion command, streaming stamped output to the daemon.
/// Returns the process exit code to propagate.
pub async fn run_companion_wrap(command: &str) -> i32 {
    let alias = match std::env::var(ENV_COMPANION_ALIAS) {
        Ok(alias) => alias,
        Err(_) => {
            eprintln!("companion-wrap: {ENV_COMPANION_ALIAS} not set");
            return 2;
        }
    };
    let name = std::env::var(ENV_COMPANION_NAME).unwrap_or_default();
    let token = std::env::var(ENV_COMPANION_TOKEN).unwrap_or_default();
    let main_socket = env::callback_socket_path();
    let wrapper_socket = env::companion_socket_path(&alias, &name);

    // Announce to the daemon; best-effort, the daemon may be restarting.
    if !token.is_empty() {
        let line = format!("COMPANION_INIT {alias} {name} {token}");
        if let Err(e) = send_command(&main_socket, &line).await {
            warn!(error = %e, "companion announce failed");
        }
    }

    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            eprintln!("companion-wrap: failed to run command: {e}");
            return 2;
        }
    };

    let (line_tx, line_rx) = mpsc::channel::<String>(256);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_lines(stderr, line_tx.clone()));
    }
    drop(line_tx);

    let forwarder = tokio::spawn(forward_lines(wrapper_socket, line_rx));

    let code = match child.wait().await {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            eprintln!("companion-wrap: wait failed: {e}");
            1
        }
    };

    // Let the forwarder drain the pipes before exiting.
    let _ = tokio::time::timeout(Duration::from_secs(2), forwarder).await;
    code
}

/// Read lines from a child pipe, stamp them, and hand them to the forwarder.
async fn pump_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let stamped = format!(
            "{} {line}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        if tx.send(stamped).await.is_err() {
            return;
        }
    }
}

/// Own the replay buffer and the connection to the daemon. Every reconnect
/// replays the buffer inside a history block, then streams live.
async fn forward_lines(socket_path: PathBuf, mut rx: mpsc::Receiver<String>) {
    let mut buffer: VecDeque<String> = VecDeque::new();
    let mut conn: Option<UnixStream> = None;

    loop {
        if conn.is_none() {
            conn = connect_with_replay(&socket_path, &buffer).await;
        }

        let line = if conn.is_some() {
            // Connected: just wait for output.
            match rx.recv().await {
                Some(line) => line,
                None => break,
            }
        } else {
            // Disconnected: wait for output or retry the connection.
            tokio::select! {
                line = rx.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
                _ = tokio::time::sleep(RECONNECT_INTERVAL) => continue,
            }
        };

        push_bounded(&mut buffer, line.clone());
        if let Some(stream) = conn.as_mut() {
            if write_all_line(stream, &line).await.is_err() {
                debug!("daemon connection lost, buffering");
                conn = None;
            }
        }
    }

    // Final flush attempt for anything still unsent.
    if conn.is_none() {
        conn = connect_with_replay(&socket_path, &buffer).await;
    }
    if let Some(mut stream) = conn {
        let _ = stream.shutdown().await;
    }
}

async fn connect_with_replay(
    socket_path: &Path,
    buffer: &VecDeque<String>,
) -> Option<UnixStream> {
    let mut stream = UnixStream::connect(socket_path).await.ok()?;
    let mut replay = String::with_capacity(64);
    replay.push_str("HISTORY_START\n");
    for line in buffer {
        replay.push_str(line);
        replay.push('\n');
    }
    replay.push_str("HISTORY_END\n");
    if stream.write_all(replay.as_bytes()).await.is_err() {
        return None;
    }
    debug!(lines = buffer.len(), "replayed history to daemon");
    Some(stream)
}

async fn write_all_line(stream: &mut UnixStream, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await
}

fn push_bounded(buffer: &mut VecDeque<String>, line: String) {
    if buffer.len() == REPLAY_BUFFER {
        buffer.pop_front();
    }
    buffer.push_back(line);
}

/// Credential helper: exchange the token for the secret and print it.
/// Returns the exit code.
pub async fn run_askpass() -> i32 {
    let (alias, token) = match (std::env::var(ENV_ALIAS), std::env::var(ENV_TOKEN)) {
        (Ok(alias), Ok(token)) => (alias, token),
        _ => {
            eprintln!("askpass: {ENV_ALIAS}/{ENV_TOKEN} not set");
            return 2;
        }
    };
    let socket = env::callback_socket_path();

    match send_command(&socket, &format!("ASKPASS {alias} {token}")).await {
        Ok(responses) => {
            for response in responses {
                if let Response::Message { message, status } = response {
                    return match status {
                        Status::Info => {
                            println!("{message}");
                            0
                        }
                        _ => {
                            eprintln!("askpass: {message}");
                            1
                        }
                    };
                }
            }
            eprintln!("askpass: no response from daemon");
            1
        }
        Err(e) => {
            eprintln!("askpass: {e}");
            1
        }
    }
}

/// Send one command line to the daemon and collect the streamed responses.
pub async fn send_command(socket: &Path, line: &str) -> std::io::Result<Vec<Response>> {
    let mut stream = UnixStream::connect(socket).await?;
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    let mut responses = Vec::new();
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str(&line) {
            Ok(response) => responses.push(response),
            Err(e) => {
                warn!(error = %e, line, "unparsable response line");
            }
        }
    }
    Ok(responses)
}

#[cfg(test)]
#[path = "wrapper_tests.rs"]
mod tests;
