// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;
use tokio::net::UnixListener;

use super::*;

#[test]
fn replay_buffer_is_bounded_fifo() {
    let mut buffer = VecDeque::new();
    for i in 0..(REPLAY_BUFFER + 10) {
        push_bounded(&mut buffer, format!("line-{i}"));
    }
    assert_eq!(buffer.len(), REPLAY_BUFFER);
    assert_eq!(buffer.front().map(String::as_str), Some("line-10"));
}

#[tokio::test]
async fn pumped_lines_carry_a_parseable_stamp() {
    let (tx, mut rx) = mpsc::channel(8);
    pump_lines(&b"hello\nworld\n"[..], tx).await;

    let first = rx.recv().await.unwrap();
    let (stamp, rest) = first.split_once(' ').unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok(), "bad stamp: {stamp}");
    assert_eq!(rest, "hello");

    let second = rx.recv().await.unwrap();
    assert!(second.ends_with(" world"));
}

#[tokio::test]
async fn forwarder_replays_then_streams() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("wrap.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let mut seen = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line);
        }
        seen
    });

    let (tx, rx) = mpsc::channel(8);
    let forwarder = tokio::spawn(forward_lines(socket_path, rx));
    tx.send("one".to_string()).await.unwrap();
    tx.send("two".to_string()).await.unwrap();
    drop(tx);
    forwarder.await.unwrap();

    let seen = server.await.unwrap();
    // Fresh connection, empty buffer: an empty replay block, then live lines.
    assert_eq!(seen, vec!["HISTORY_START", "HISTORY_END", "one", "two"]);
}

#[tokio::test]
async fn send_command_collects_streamed_responses() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("main.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.split();
        let mut lines = BufReader::new(reader).lines();
        let request = lines.next_line().await.unwrap().unwrap();
        use tokio::io::AsyncWriteExt;
        writer
            .write_all(b"{\"message\":\"ok\",\"status\":\"INFO\"}\n{\"data\":{\"n\":1}}\n")
            .await
            .unwrap();
        writer.shutdown().await.unwrap();
        request
    });

    let responses = send_command(&socket_path, "STATUS").await.unwrap();
    assert_eq!(server.await.unwrap(), "STATUS");
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0], Response::info("ok"));
    assert!(matches!(responses[1], Response::Data { .. }));
}
