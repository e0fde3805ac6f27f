// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket client: send one command line, stream responses until EOF.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::output;

/// Send `line` to the daemon and print each response as it arrives.
/// Returns true iff any response carried status ERROR.
pub async fn run(config_dir: &Path, line: &str) -> Result<bool> {
    let socket_path = config_dir.join("overseerd.sock");
    let mut stream = UnixStream::connect(&socket_path).await.with_context(|| {
        format!(
            "cannot reach daemon at {} (is it running? try `overseer daemon start`)",
            socket_path.display()
        )
    })?;

    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    let mut any_error = false;
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(response) => {
                if output::print(&response) {
                    any_error = true;
                }
            }
            Err(_) => println!("{line}"),
        }
    }
    Ok(any_error)
}
