//! Shared utilities for engine integration tests.
//!
//! Provides a minimal chunk-streaming HTTP server: wiremock delivers response
//! bodies in one piece, so mid-transfer pause/cancel and Range-continuation
//! scenarios need a server that paces its body writes and records the Range
//! headers it saw.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Initializes tracing output for a test, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One request observed by the streaming server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Value of the `Range` header, when present.
    pub range: Option<String>,
}

/// A tiny HTTP/1.1 server that streams its body in paced chunks.
///
/// Honors `Range: bytes=N-` with a `206` + `Content-Range` reply unless
/// configured to ignore ranges (replying `200` with the full body, the way
/// misbehaving servers do).
pub struct StreamingServer {
    uri: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StreamingServer {
    /// Starts the server on an ephemeral local port.
    pub async fn start(
        content: Vec<u8>,
        chunk_size: usize,
        chunk_delay: Duration,
        honor_range: bool,
    ) -> Self {
        Self::start_inner(content, chunk_size, chunk_delay, honor_range, None).await
    }

    /// Starts a server that serves the first `fail_from` requests normally
    /// and answers every later request with `404 Not Found`, the way a
    /// source that expired between pause and resume would.
    pub async fn start_failing_after(
        content: Vec<u8>,
        chunk_size: usize,
        chunk_delay: Duration,
        honor_range: bool,
        fail_from: usize,
    ) -> Self {
        Self::start_inner(content, chunk_size, chunk_delay, honor_range, Some(fail_from)).await
    }

    async fn start_inner(
        content: Vec<u8>,
        chunk_size: usize,
        chunk_delay: Duration,
        honor_range: bool,
        fail_from: Option<usize>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind streaming server");
        let addr = listener.local_addr().expect("local addr");
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));

        let content = Arc::new(content);
        let accept_requests = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let content = Arc::clone(&content);
                let requests = Arc::clone(&accept_requests);
                tokio::spawn(async move {
                    serve_connection(
                        stream,
                        &content,
                        chunk_size,
                        chunk_delay,
                        honor_range,
                        fail_from,
                        &requests,
                    )
                    .await;
                });
            }
        });

        Self {
            uri: format!("http://{addr}"),
            requests,
        }
    }

    /// Base URI of the server, e.g. `http://127.0.0.1:PORT`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// All requests observed so far.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn serve_connection(
    mut stream: tokio::net::TcpStream,
    content: &[u8],
    chunk_size: usize,
    chunk_delay: Duration,
    honor_range: bool,
    fail_from: Option<usize>,
    requests: &Mutex<Vec<RecordedRequest>>,
) {
    let range = match read_request(&mut stream).await {
        Some(range) => range,
        None => return,
    };
    let request_index = {
        let mut recorded = requests.lock().await;
        recorded.push(RecordedRequest {
            range: range.clone(),
        });
        recorded.len() - 1
    };

    if fail_from.is_some_and(|from| request_index >= from) {
        let _ = stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await;
        return;
    }

    let offset = if honor_range {
        range
            .as_deref()
            .and_then(parse_range_offset)
            .filter(|offset| *offset < content.len() as u64)
            .unwrap_or(0)
    } else {
        0
    };

    #[allow(clippy::cast_possible_truncation)]
    let body = &content[offset as usize..];
    let header = if honor_range && offset > 0 {
        format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
            body.len(),
            offset,
            content.len() - 1,
            content.len(),
        )
    } else {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len(),
        )
    };

    if stream.write_all(header.as_bytes()).await.is_err() {
        return;
    }

    for chunk in body.chunks(chunk_size) {
        if stream.write_all(chunk).await.is_err() {
            // Client hung up (pause/cancel drops the connection).
            return;
        }
        if stream.flush().await.is_err() {
            return;
        }
        tokio::time::sleep(chunk_delay).await;
    }
}

/// Reads the request head and extracts the `Range` header, if any.
/// Returns `None` when the client disconnects before completing the head.
async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<Option<String>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => buf.extend_from_slice(&byte),
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let range = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("range")
                .then(|| value.trim().to_string())
        });
    Some(range)
}

fn parse_range_offset(value: &str) -> Option<u64> {
    value
        .strip_prefix("bytes=")?
        .split('-')
        .next()?
        .parse::<u64>()
        .ok()
}

/// Deterministic test payload of `len` bytes.
pub fn patterned_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}
