//! Query execution strategies
//!
//! Blocking mode is a straight pass-through to [`Provider::query`].
//! Progressive mode drains [`Provider::stream_query`] into one buffer and
//! reports progress transitions to an observer along the way. Either way the
//! caller gets a whole [`QueryResponse`] or an error, never a partial answer.

use crate::error::ApiError;
use crate::provider::{Provider, QueryRequest, QueryResponse};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Blocking,
    Progressive,
}

/// Progress transitions of a single query.
///
/// Hooks run inline on the data path and must return quickly.
pub trait ProgressObserver: Send + Sync {
    fn on_request_start(&self, _provider: &str, _model: &str) {}

    fn on_first_content(&self) {}

    /// Called once per query, whether it succeeded or not.
    fn on_complete(&self) {}
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Run one request against `provider`.
///
/// Cancelling `cancel` resolves promptly with [`ApiError::Cancelled`]. A
/// backend without streaming support is always driven in blocking mode.
pub async fn execute(
    provider: &dyn Provider,
    request: QueryRequest,
    mode: ExecutionMode,
    observer: &dyn ProgressObserver,
    cancel: &CancellationToken,
) -> Result<QueryResponse, ApiError> {
    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }

    let mode = if mode == ExecutionMode::Progressive && !provider.supports_streaming() {
        debug!(
            provider = provider.name(),
            "Provider cannot stream, using blocking mode"
        );
        ExecutionMode::Blocking
    } else {
        mode
    };

    info!(
        provider = provider.name(),
        model = %request.model,
        mode = ?mode,
        "Dispatching query"
    );
    observer.on_request_start(provider.name(), &request.model);

    let result = match mode {
        ExecutionMode::Blocking => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ApiError::Cancelled),
                response = provider.query(request) => response,
            }
        }
        ExecutionMode::Progressive => accumulate(provider, request, observer, cancel).await,
    };

    observer.on_complete();
    result
}

async fn accumulate(
    provider: &dyn Provider,
    request: QueryRequest,
    observer: &dyn ProgressObserver,
    cancel: &CancellationToken,
) -> Result<QueryResponse, ApiError> {
    let model = request.model.clone();
    let mut stream = provider.stream_query(request);
    let mut content = String::new();
    let mut seen_content = false;

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            item = stream.next() => item,
        };

        match item {
            Some(Ok(chunk)) => {
                if !seen_content && !chunk.content.is_empty() {
                    seen_content = true;
                    observer.on_first_content();
                }
                content.push_str(&chunk.content);

                if chunk.is_complete {
                    return Ok(QueryResponse {
                        content,
                        tokens_input: chunk.tokens_input,
                        tokens_output: chunk.tokens_output,
                        model,
                        provider: provider.name().to_string(),
                        cached: false,
                    });
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(ApiError::ProviderTimeout(format!(
                    "{}: stream ended without a completion signal",
                    provider.name()
                )))
            }
        }
    }
}
