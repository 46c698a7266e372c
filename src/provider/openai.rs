//! OpenAI chat-completions adapter.
//!
//! Blocking calls use a plain JSON round trip; streaming reads server-sent
//! events and asks for a trailing usage block so token counts are exact.

use crate::error::ApiError;
use crate::pricing::PricingTable;
use crate::provider::http::{
    build_provider_http_client, check_status, emit, map_http_error, spawn_chunk_producer,
    ChunkSender, LineBuffer,
};
use crate::provider::{ChunkStream, Model, Provider, QueryRequest, QueryResponse, StreamChunk};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const PROVIDER_NAME: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Models offered for selection; the chat API does not filter its own list
/// down to chat-capable models, so the catalogue is maintained by hand.
const CATALOGUE: &[(&str, &str)] = &[
    ("gpt-4o", "GPT-4o"),
    ("gpt-4o-mini", "GPT-4o Mini"),
    ("gpt-4-turbo", "GPT-4 Turbo"),
];

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_query(request: &'a QueryRequest, stream: bool) -> Self {
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
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: &request.stop_sequences,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

/// OpenAI provider client
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    pricing: Arc<PricingTable>,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        pricing: Arc<PricingTable>,
    ) -> Result<Self, ApiError> {
        if api_key.trim().is_empty() {
            return Err(ApiError::ProviderNotConfigured(
                "OpenAI API key is required (set OPENAI_API_KEY)".to_string(),
            ));
        }
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let client = build_provider_http_client(PROVIDER_NAME, &base_url)?;

        Ok(Self {
            client,
            api_key,
            base_url,
            pricing,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, ApiError> {
        let body = ChatCompletionRequest::from_query(&request, false);
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error(PROVIDER_NAME, e))?;
        let response = check_status(PROVIDER_NAME, response).await?;

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            ApiError::ProviderError(format!("{}: failed to parse response: {}", PROVIDER_NAME, e))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                ApiError::ProviderError(format!("{}: no choices in response", PROVIDER_NAME))
            })?
            .message
            .content
            .unwrap_or_default();
        let usage = completion.usage.unwrap_or_default();

        Ok(QueryResponse {
            content,
            tokens_input: usage.prompt_tokens,
            tokens_output: usage.completion_tokens,
            model: request.model,
            provider: PROVIDER_NAME.to_string(),
            cached: false,
        })
    }

    fn stream_query(&self, request: QueryRequest) -> ChunkStream {
        let client = self.client.clone();
        let url = self.completions_url();
        let api_key = self.api_key.clone();

        spawn_chunk_producer(move |tx| async move {
            let body = ChatCompletionRequest::from_query(&request, true);
            let response = client
                .post(url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| map_http_error(PROVIDER_NAME, e))?;
            let response = check_status(PROVIDER_NAME, response).await?;
            read_event_stream(response, tx).await
        })
    }

    async fn available_models(&self) -> Result<Vec<Model>, ApiError> {
        Ok(CATALOGUE
            .iter()
            .map(|(id, display_name)| Model {
                id: id.to_string(),
                display_name: display_name.to_string(),
                provider: PROVIDER_NAME.to_string(),
                pricing: self.pricing.get(id).map(|p| p.pricing()),
            })
            .collect())
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

/// Outcome of one SSE line.
enum EventLine {
    Skip,
    Delta(String),
    Finished,
    Terminator,
}

#[derive(Debug, Default)]
struct EventState {
    usage: Option<Usage>,
    finished: bool,
}

impl EventState {
    fn handle_line(&mut self, line: &str) -> Result<EventLine, ApiError> {
        let Some(data) = line.strip_prefix("data:") else {
            // comments, event names and blank separators carry nothing we need
            return Ok(EventLine::Skip);
        };
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(EventLine::Terminator);
        }
        if data.is_empty() {
            return Ok(EventLine::Skip);
        }

        let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
            ApiError::ProviderError(format!("{}: malformed stream event: {}", PROVIDER_NAME, e))
        })?;
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let mut text = String::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                text.push_str(&content);
            }
            if choice.finish_reason.is_some() {
                self.finished = true;
            }
        }
        if text.is_empty() {
            Ok(if self.finished {
                EventLine::Finished
            } else {
                EventLine::Skip
            })
        } else {
            Ok(EventLine::Delta(text))
        }
    }

    fn terminal_chunk(&self) -> StreamChunk {
        let usage = self.usage.as_ref();
        StreamChunk::done(
            usage.map(|u| u.prompt_tokens).unwrap_or(0),
            usage.map(|u| u.completion_tokens).unwrap_or(0),
        )
    }
}

async fn read_event_stream(response: reqwest::Response, tx: ChunkSender) -> Result<(), ApiError> {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::new();
    let mut state = EventState::default();

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
            match state.handle_line(&line)? {
                EventLine::Skip | EventLine::Finished => {}
                EventLine::Delta(text) => {
                    if !emit(&tx, StreamChunk::delta(text)).await {
                        return Ok(());
                    }
                }
                EventLine::Terminator => {
                    emit(&tx, state.terminal_chunk()).await;
                    return Ok(());
                }
            }
        }
    }

    if let Some(line) = lines.finish() {
        match state.handle_line(&line)? {
            EventLine::Delta(text) => {
                if !emit(&tx, StreamChunk::delta(text)).await {
                    return Ok(());
                }
            }
            EventLine::Terminator => {
                emit(&tx, state.terminal_chunk()).await;
                return Ok(());
            }
            EventLine::Skip | EventLine::Finished => {}
        }
    }

    // Connection closed without [DONE]; a completed generation still counts.
    if state.finished || state.usage.is_some() {
        emit(&tx, state.terminal_chunk()).await;
        Ok(())
    } else {
        Err(ApiError::ProviderTimeout(format!(
            "{}: stream closed before completion",
            PROVIDER_NAME
        )))
    }
}
