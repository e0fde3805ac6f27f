// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streamed responses: one JSON object per line.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Severity carried with every message. The client maps ERROR to a non-zero
/// exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Info,
    Warn,
    Error,
}

/// One response object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Message { message: String, status: Status },
    Data { data: serde_json::Value },
}

impl Response {
    pub fn info(message: impl Into<String>) -> Self {
        Response::Message { message: message.into(), status: Status::Info }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Response::Message { message: message.into(), status: Status::Warn }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Message { message: message.into(), status: Status::Error }
    }

    pub fn data(data: serde_json::Value) -> Self {
        Response::Data { data }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Message { status: Status::Error, .. })
    }
}

/// Serialize one response followed by a newline.
pub async fn write_line<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n');
    writer.write_all(&json).await
}
