// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response rendering.

use overseer_daemon::protocol::{Response, Status};

/// Print one streamed response. Returns true iff it was an ERROR.
pub fn print(response: &Response) -> bool {
    match response {
        Response::Message { message, status } => match status {
            Status::Info => {
                println!("{message}");
                false
            }
            Status::Warn => {
                eprintln!("warning: {message}");
                false
            }
            Status::Error => {
                eprintln!("error: {message}");
                true
            }
        },
        Response::Data { data } => {
            match serde_json::to_string_pretty(data) {
                Ok(pretty) => println!("{pretty}"),
                Err(_) => println!("{data}"),
            }
            false
        }
    }
}
