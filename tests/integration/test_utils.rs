//! Shared test utilities for integration tests

use async_trait::async_trait;
use heyman::error::ApiError;
use heyman::executor::ExecutionMode;
use heyman::pipeline::QueryInput;
use heyman::provider::{ChunkStream, Model, Provider, QueryRequest, QueryResponse, StreamChunk};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
}

/// Answers from a script, one entry per call; the last entry repeats.
pub struct StubProvider {
    script: Vec<String>,
    calls: AtomicUsize,
    pub requests: Mutex<Vec<QueryRequest>>,
}

impl StubProvider {
    pub fn new(script: &[&str]) -> Self {
        Self {
            script: script.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self, request: QueryRequest) -> QueryResponse {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .script
            .get(n)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_default();
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        QueryResponse {
            content,
            tokens_input: 100,
            tokens_output: 7,
            model,
            provider: "stub".to_string(),
            cached: false,
        }
    }
}

#[async_trait]
impl Provider for StubProvider {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, ApiError> {
        Ok(self.next(request))
    }

    fn stream_query(&self, request: QueryRequest) -> ChunkStream {
        let response = self.next(request);
        // Split the answer into word-sized deltas to exercise accumulation
        let mut chunks: Vec<Result<StreamChunk, ApiError>> = response
            .content
            .split_inclusive(' ')
            .map(|piece| Ok(StreamChunk::delta(piece)))
            .collect();
        chunks.push(Ok(StreamChunk::done(
            response.tokens_input,
            response.tokens_output,
        )));
        Box::pin(futures::stream::iter(chunks))
    }

    async fn available_models(&self) -> Result<Vec<Model>, ApiError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

pub fn query_input(tool: &str, question: &str, model: &str) -> QueryInput {
    QueryInput {
        tool: tool.to_string(),
        question: question.to_string(),
        model: model.to_string(),
        system_prompt: "Answer with one command.".to_string(),
        user_prompt: format!("Man page for '{}':\n\n...\n\nUser question: {}", tool, question),
        retry_prompt: format!("Respond with ONLY the command, starting with '{}'.", tool),
        explain: false,
        max_tokens: 2000,
        temperature: 0.1,
        context_window: 8192,
        bypass_cache: false,
        mode: ExecutionMode::Progressive,
    }
}
