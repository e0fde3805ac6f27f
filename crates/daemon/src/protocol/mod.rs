// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Wire format: the client sends a single newline-terminated command line
//! (`VERB arg1 arg2 …`); the daemon streams back newline-delimited JSON
//! objects, `{"message": …, "status": "INFO"|"WARN"|"ERROR"}` for progress
//! and `{"data": …}` for bulk payloads, then half-closes. The client exits
//! non-zero iff any message carried status ERROR.

mod request;
mod response;

pub use request::{masked, Command, RequestError};
pub use response::{write_line, Response, Status};

#[cfg(test)]
#[path = "request_tests.rs"]
mod request_tests;
