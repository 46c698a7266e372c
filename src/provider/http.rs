//! HTTP plumbing shared by the backend adapters: client construction, status
//! and transport error mapping, line framing for streamed bodies, and the
//! producer task that feeds a [`ChunkStream`].

use crate::error::ApiError;
use crate::provider::{ChunkStream, StreamChunk};
use reqwest::{Client, StatusCode, Url};
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Only connection setup is bounded. Prompt evaluation and generation on a
/// local model can legitimately run for minutes; Ctrl-C ends a stuck call.
const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chunks buffered between a producer task and its consumer.
const STREAM_CHANNEL_CAPACITY: usize = 32;

pub(crate) type ChunkSender = mpsc::Sender<Result<StreamChunk, ApiError>>;

/// Build the client for one backend. Proxy settings come from the
/// environment (`HTTPS_PROXY`, `NO_PROXY`) except for loopback backends,
/// which are always reached directly.
pub(crate) fn build_provider_http_client(
    provider: &str,
    base_url: &str,
) -> Result<Client, ApiError> {
    let mut builder = Client::builder().connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT);
    if is_loopback(base_url) {
        builder = builder.no_proxy();
    }
    builder.build().map_err(|e| {
        ApiError::ProviderError(format!("{}: failed to create HTTP client: {}", provider, e))
    })
}

fn is_loopback(base_url: &str) -> bool {
    let Ok(url) = Url::parse(base_url) else {
        return false;
    };
    match url.host_str() {
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_or(host.eq_ignore_ascii_case("localhost"), |ip| ip.is_loopback()),
        None => false,
    }
}

/// Map transport-level reqwest failures to ApiError, tagged with the backend name
pub(crate) fn map_http_error(provider: &str, error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        return map_status(provider, status, &error.to_string());
    }
    if error.is_timeout() {
        ApiError::ProviderTimeout(format!("{}: request timeout: {}", provider, error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("{}: connection error: {}", provider, error))
    } else if error.is_decode() {
        ApiError::ProviderError(format!("{}: malformed response: {}", provider, error))
    } else {
        ApiError::ProviderError(format!("{}: HTTP error: {}", provider, error))
    }
}

/// Map a non-success HTTP status and its body to ApiError
pub(crate) fn map_status(provider: &str, status: StatusCode, body: &str) -> ApiError {
    match status.as_u16() {
        401 | 403 => {
            ApiError::ProviderAuthFailed(format!("{}: authentication failed: {}", provider, body))
        }
        404 => ApiError::ProviderModelNotFound(format!("{}: model not found: {}", provider, body)),
        429 => ApiError::ProviderRateLimit(format!("{}: rate limit exceeded: {}", provider, body)),
        _ => ApiError::ProviderRequestFailed(format!(
            "{}: request failed with status {}: {}",
            provider, status, body
        )),
    }
}

/// Turn a non-success response into an error, consuming its body for context.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_status(provider, status, &error_text))
}

/// Splits a byte stream into newline-terminated lines.
///
/// Bytes are buffered until a full line is available so that multi-byte
/// characters split across network reads decode correctly.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line they complete, without terminators.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line));
        }
        lines
    }

    /// Remaining unterminated text, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c| c == '\r' || c == '\n')
        .to_string()
}

/// Run `producer` on its own task and expose what it sends as a [`ChunkStream`].
///
/// The producer reports its outcome by returning: `Err` is forwarded as the
/// final stream item. A producer whose consumer has gone away finds its sends
/// failing and should stop; nothing else is needed to shut it down.
pub(crate) fn spawn_chunk_producer<F, Fut>(producer: F) -> ChunkStream
where
    F: FnOnce(ChunkSender) -> Fut,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let error_tx = tx.clone();
    let task = producer(tx);
    tokio::spawn(async move {
        if let Err(err) = task.await {
            // Receiver may already be gone; nothing left to report to.
            let _ = error_tx.send(Err(err)).await;
        }
    });
    Box::pin(ReceiverStream::new(rx))
}

/// Send one chunk; false means the consumer stopped listening.
pub(crate) async fn emit(tx: &ChunkSender, chunk: StreamChunk) -> bool {
    tx.send(Ok(chunk)).await.is_ok()
}
