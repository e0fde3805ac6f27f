// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attach sessions: stream a log bus to a client until it hangs up.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::net::unix::OwnedWriteHalf;
use tracing::debug;

use crate::protocol::{write_line, Response};

use super::{ListenCtx, ReadLines};

/// Default history lines shown when the client doesn't ask for a count.
const DEFAULT_HISTORY: usize = 100;

/// `LOGS [count | no_history]`: dump recent daemon log lines and close.
pub(super) async fn serve_logs<W>(
    writer: &mut W,
    ctx: &Arc<ListenCtx>,
    count: Option<usize>,
    history: bool,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if history {
        let (_, lines) = ctx.daemon_bus.subscribe_with_history(count.unwrap_or(DEFAULT_HISTORY));
        for line in lines {
            write_line(writer, &Response::info(line)).await?;
        }
    }
    Ok(())
}

/// `ATTACH [count | no_history]`: dump history, then follow the daemon log
/// until the client disconnects or the daemon shuts down.
pub(super) async fn serve_attach(
    client: ReadLines,
    mut writer: OwnedWriteHalf,
    ctx: &Arc<ListenCtx>,
    count: Option<usize>,
    history: bool,
) -> std::io::Result<()> {
    let (sub, lines) = if history {
        ctx.daemon_bus.subscribe_with_history(count.unwrap_or(DEFAULT_HISTORY))
    } else {
        (ctx.daemon_bus.subscribe(), Vec::new())
    };
    for line in lines {
        write_line(&mut writer, &Response::info(line)).await?;
    }
    follow(client, writer, ctx, sub, None).await
}

/// `COMPANION_ATTACH <alias> <name> [lines] [no_history]`.
///
/// Attaching to a configured-but-idle companion creates a dormant entry so
/// the session can wait for a later start.
pub(super) async fn serve_companion_attach(
    client: ReadLines,
    mut writer: OwnedWriteHalf,
    ctx: &Arc<ListenCtx>,
    alias: &str,
    name: &str,
    history_lines: Option<usize>,
    history: bool,
) -> std::io::Result<()> {
    let entry = match ctx.companions.attach_entry(alias, name) {
        Ok(entry) => entry,
        Err(message) => {
            write_line(&mut writer, &Response::error(message)).await?;
            return Ok(());
        }
    };

    write_line(
        &mut writer,
        &Response::info(format!("Attached to companion {name} for tunnel {alias}")),
    )
    .await?;

    // Live companion on an initial attach gets history; reconnects and
    // dormant entries subscribe bare.
    let show_history = history && entry.companion_state().is_live();
    let (sub, lines) = if show_history {
        entry.output.subscribe_with_history(history_lines.unwrap_or(DEFAULT_HISTORY))
    } else {
        (entry.output.subscribe(), Vec::new())
    };
    for line in lines {
        write_line(&mut writer, &Response::info(line)).await?;
    }

    let ctx_token = entry.ctx();
    follow(client, writer, ctx, sub, Some(ctx_token)).await
}

/// Pump bus lines to the client until disconnect, bus close, companion
/// context cancellation, or daemon shutdown.
async fn follow(
    mut client: ReadLines,
    mut writer: OwnedWriteHalf,
    ctx: &Arc<ListenCtx>,
    mut sub: overseer_core::BusSubscriber,
    entry_ctx: Option<tokio_util::sync::CancellationToken>,
) -> std::io::Result<()> {
    let entry_cancelled = async {
        match &entry_ctx {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(entry_cancelled);

    loop {
        tokio::select! {
            line = sub.recv() => match line {
                Some(line) => write_line(&mut writer, &Response::info(line)).await?,
                None => return Ok(()),
            },
            read = client.next_line() => {
                debug!("attach client disconnected");
                let _ = read;
                return Ok(());
            }
            _ = &mut entry_cancelled => {
                write_line(&mut writer, &Response::warn("companion stopped")).await?;
                return Ok(());
            }
            _ = ctx.root.cancelled() => return Ok(()),
        }
    }
}
