//! Shared test helpers: a recording handler and a chunked SSE server.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use caeli_stream::error::StreamError;
use caeli_stream::sse::{EventKind, SseEvent, StreamHandler};

/// Records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub events: Vec<SseEvent>,
    pub starts: usize,
    pub completes: usize,
    pub errors: Vec<String>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|e| e.kind.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| e.text().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl StreamHandler for RecordingHandler {
    async fn on_event(&mut self, event: SseEvent) {
        self.events.push(event);
    }

    async fn on_start(&mut self) {
        self.starts += 1;
    }

    async fn on_complete(&mut self) {
        self.completes += 1;
    }

    async fn on_error(&mut self, error: &StreamError) {
        self.errors.push(error.to_string());
    }
}

/// Join `data:` payloads into an SSE response body.
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {p}\n\n"))
        .collect()
}

/// Serve one connection, writing each chunk as a separate HTTP chunk with a
/// pause in between. When `hold_open` is set the response never finishes.
///
/// Returns the URL to POST to.
pub async fn spawn_chunked_server(chunks: Vec<Vec<u8>>, hold_open: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();

        for chunk in chunks {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
            frame.extend_from_slice(&chunk);
            frame.extend_from_slice(b"\r\n");
            if socket.write_all(&frame).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
        }

        if hold_open {
            tokio::time::sleep(Duration::from_secs(60)).await;
        } else {
            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.flush().await;
        }
    });

    format!("http://{addr}/stream")
}
