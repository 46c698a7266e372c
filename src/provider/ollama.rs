//! Ollama adapter for a locally running daemon.
//!
//! `/api/chat` answers with newline-delimited JSON when streaming; the line
//! with `done: true` carries the token accounting.

use crate::error::ApiError;
use crate::provider::http::{
    build_provider_http_client, check_status, emit, map_http_error, spawn_chunk_producer,
    ChunkSender, LineBuffer,
};
use crate::provider::{
    ChunkStream, Model, Provider, QueryRequest, QueryResponse, StreamChunk, DEFAULT_CONTEXT_WINDOW,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const PROVIDER_NAME: &str = "ollama";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions<'a> {
    temperature: f32,
    num_predict: u32,
    num_ctx: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions<'a>,
}

impl<'a> ChatRequest<'a> {
    fn from_query(request: &'a QueryRequest, stream: bool) -> Self {
        let num_ctx = if request.context_window == 0 {
            DEFAULT_CONTEXT_WINDOW
        } else {
            request.context_window
        };
        Self {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            stream,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                num_ctx,
                stop: &request.stop_sequences,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// One NDJSON line, or the whole body of a non-streaming call
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: ResponseMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagInfo>,
}

#[derive(Debug, Deserialize)]
struct TagInfo {
    name: String,
}

#[derive(Debug, Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    model_info: HashMap<String, serde_json::Value>,
}

impl ShowResponse {
    /// Architectures namespace the key (`llama.context_length`,
    /// `mistral3.context_length`, ...), so match on the suffix.
    fn context_length(&self) -> Option<u32> {
        self.model_info
            .iter()
            .filter(|(key, _)| *key == "context_length" || key.ends_with(".context_length"))
            .find_map(|(_, value)| value.as_u64())
            .map(|len| u32::try_from(len).unwrap_or(u32::MAX))
    }
}

/// Ollama provider client
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>) -> Result<Self, ApiError> {
        let base_url = normalize_host(base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_HOST));
        let client = build_provider_http_client(PROVIDER_NAME, &base_url)?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// `OLLAMA_HOST` is commonly set without a scheme (`0.0.0.0:11434`).
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

fn parse_line(line: &str) -> Result<ChatResponse, ApiError> {
    let parsed: ChatResponse = serde_json::from_str(line).map_err(|e| {
        ApiError::ProviderError(format!("{}: malformed response line: {}", PROVIDER_NAME, e))
    })?;
    match parsed.error {
        Some(message) => Err(ApiError::ProviderError(format!(
            "{}: {}",
            PROVIDER_NAME, message
        ))),
        None => Ok(parsed),
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, ApiError> {
        let body = ChatRequest::from_query(&request, false);
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error(PROVIDER_NAME, e))?;
        let response = check_status(PROVIDER_NAME, response).await?;

        let text = response
            .text()
            .await
            .map_err(|e| map_http_error(PROVIDER_NAME, e))?;

        // Some daemon versions still stream when asked not to; accept both shapes.
        let mut content = String::new();
        let mut tokens = (0, 0);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let parsed = parse_line(line)?;
            content.push_str(&parsed.message.content);
            if parsed.done {
                tokens = (parsed.prompt_eval_count, parsed.eval_count);
            }
        }

        Ok(QueryResponse {
            content,
            tokens_input: tokens.0,
            tokens_output: tokens.1,
            model: request.model,
            provider: PROVIDER_NAME.to_string(),
            cached: false,
        })
    }

    fn stream_query(&self, request: QueryRequest) -> ChunkStream {
        let client = self.client.clone();
        let url = self.url("/api/chat");

        spawn_chunk_producer(move |tx| async move {
            let body = ChatRequest::from_query(&request, true);
            let response = client
                .post(url)
                .json(&body)
                .send()
                .await
                .map_err(|e| map_http_error(PROVIDER_NAME, e))?;
            let response = check_status(PROVIDER_NAME, response).await?;
            read_ndjson_stream(response, tx).await
        })
    }

    async fn available_models(&self) -> Result<Vec<Model>, ApiError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| map_http_error(PROVIDER_NAME, e))?;
        let response = check_status(PROVIDER_NAME, response).await?;

        let tags: TagsResponse = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!(
                "{}: failed to parse models response: {}",
                PROVIDER_NAME, e
            ))
        })?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| Model {
                display_name: m.name.clone(),
                id: m.name,
                provider: PROVIDER_NAME.to_string(),
                pricing: None,
            })
            .collect())
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn model_context_window(&self, model: &str) -> Result<Option<u32>, ApiError> {
        let response = self
            .client
            .post(self.url("/api/show"))
            .json(&ShowRequest { model })
            .send()
            .await
            .map_err(|e| map_http_error(PROVIDER_NAME, e))?;
        let response = check_status(PROVIDER_NAME, response).await?;

        let show: ShowResponse = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!("{}: failed to parse model info: {}", PROVIDER_NAME, e))
        })?;
        Ok(show.context_length())
    }
}

/// Forward one parsed line; `Ok(false)` means stop reading.
async fn forward_line(line: &str, tx: &ChunkSender) -> Result<bool, ApiError> {
    if line.trim().is_empty() {
        return Ok(true);
    }
    let parsed = parse_line(line)?;
    if parsed.done {
        if !parsed.message.content.is_empty() {
            emit(tx, StreamChunk::delta(parsed.message.content)).await;
        }
        emit(
            tx,
            StreamChunk::done(parsed.prompt_eval_count, parsed.eval_count),
        )
        .await;
        return Ok(false);
    }
    if parsed.message.content.is_empty() {
        return Ok(true);
    }
    Ok(emit(tx, StreamChunk::delta(parsed.message.content)).await)
}

async fn read_ndjson_stream(response: reqwest::Response, tx: ChunkSender) -> Result<(), ApiError> {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::new();

    loop {
        let bytes = tokio::select! {
            _ = tx.closed() => {
                debug!(provider = PROVIDER_NAME, "Stream consumer went away");
                return Ok(());
            }
            next = body.next() => match next {
                Some(bytes) => bytes.map_err(|e| map_http_error(PROVIDER_NAME, e))?,
                None => break,
            },
        };

        for line in lines.push(&bytes) {
            if !forward_line(&line, &tx).await? {
                return Ok(());
            }
        }
    }

    if let Some(line) = lines.finish() {
        if !forward_line(&line, &tx).await? {
            return Ok(());
        }
    }

    Err(ApiError::ProviderTimeout(format!(
        "{}: stream closed before completion",
        PROVIDER_NAME
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("0.0.0.0:11434"), "http://0.0.0.0:11434");
        assert_eq!(
            normalize_host("https://ollama.internal/"),
            "https://ollama.internal"
        );
    }

    #[test]
    fn test_request_defaults_num_ctx() {
        let request = QueryRequest::new("llama3", "sys", "user").with_max_tokens(256);
        let body = serde_json::to_value(ChatRequest::from_query(&request, true)).unwrap();

        assert_eq!(body["options"]["num_ctx"], DEFAULT_CONTEXT_WINDOW);
        assert_eq!(body["options"]["num_predict"], 256);
        assert_eq!(body["stream"], true);
        assert!(body["options"].get("stop").is_none());

        let stopped = request.clone().with_stop_sequences(vec!["\n\n".to_string()]);
        let body = serde_json::to_value(ChatRequest::from_query(&stopped, false)).unwrap();
        assert_eq!(body["options"]["stop"][0], "\n\n");

        let sized = request.with_context_window(4096);
        let body = serde_json::to_value(ChatRequest::from_query(&sized, false)).unwrap();
        assert_eq!(body["options"]["num_ctx"], 4096);
    }

    #[test]
    fn test_context_length_matches_any_architecture() {
        let show: ShowResponse = serde_json::from_str(
            r#"{"model_info":{"general.architecture":"qwen2","qwen2.context_length":32768}}"#,
        )
        .unwrap();
        assert_eq!(show.context_length(), Some(32768));

        let empty: ShowResponse = serde_json::from_str(r#"{"model_info":{}}"#).unwrap();
        assert_eq!(empty.context_length(), None);
    }

    #[test]
    fn test_parse_line_surfaces_daemon_error() {
        assert!(matches!(
            parse_line(r#"{"error":"model 'nope' not found"}"#),
            Err(ApiError::ProviderError(msg)) if msg.contains("nope")
        ));
    }
}
