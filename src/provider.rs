//! Model Provider Abstraction
//!
//! Unified interface over the LLM backends heyman can talk to (the OpenAI chat
//! API and a local Ollama daemon). Callers only see the [`Provider`] contract;
//! each backend lives in its own adapter module and speaks its own wire format.

use crate::error::ApiError;
use crate::pricing::PricingTable;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod http;
pub mod ollama;
pub mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

/// Context window used when neither the profile nor the backend supplies one.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 8192;

/// Upper bound applied to auto-detected context windows. Local models often
/// advertise far more context than a workstation can actually hold.
pub const MAX_DETECTED_CONTEXT_WINDOW: u32 = 8192;

/// Cost structure for a model, in dollars per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million_tokens: f64,
    pub output_per_million_tokens: f64,
}

/// A selectable backend model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub pricing: Option<Pricing>,
}

/// A single completion request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Context budget in tokens; 0 lets the adapter pick its default.
    pub context_window: u32,
    pub stop_sequences: Vec<String>,
}

impl QueryRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            max_tokens: 2000,
            temperature: 0.1,
            context_window: 0,
            stop_sequences: Vec::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_context_window(mut self, context_window: u32) -> Self {
        self.context_window = context_window;
        self
    }

    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    /// Build a follow-up request that keeps model, system prompt and sampling
    /// settings but replaces the user content.
    pub fn with_user_prompt(&self, user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            ..self.clone()
        }
    }
}

/// A completed answer.
///
/// Field names serialize in the same shape the on-disk cache has always used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResponse {
    pub content: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub model: String,
    pub provider: String,
    #[serde(default)]
    pub cached: bool,
}

/// One increment of a streaming response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamChunk {
    pub content: String,
    pub is_complete: bool,
    /// Only populated on the terminal chunk
    pub tokens_input: u32,
    /// Only populated on the terminal chunk
    pub tokens_output: u32,
}

impl StreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn done(tokens_input: u32, tokens_output: u32) -> Self {
        Self {
            content: String::new(),
            is_complete: true,
            tokens_input,
            tokens_output,
        }
    }
}

/// Lazy, finite, non-restartable sequence of chunks.
///
/// A well-behaved stream yields zero or more `Ok` deltas followed by exactly
/// one of: an `Ok` chunk with `is_complete` set, or an `Err`.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ApiError>> + Send>>;

/// Capability contract implemented by every backend adapter
#[async_trait]
pub trait Provider: Send + Sync {
    /// Issue one blocking round trip.
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, ApiError>;

    /// Issue one streaming round trip.
    fn stream_query(&self, request: QueryRequest) -> ChunkStream;

    /// Enumerate selectable models.
    async fn available_models(&self) -> Result<Vec<Model>, ApiError>;

    /// Stable backend identifier used for response provenance.
    fn name(&self) -> &str;

    fn supports_streaming(&self) -> bool;

    /// Context window the backend reports for `model`, if it can tell.
    async fn model_context_window(&self, _model: &str) -> Result<Option<u32>, ApiError> {
        Ok(None)
    }
}

/// Closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAI),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(ApiError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Resolved connection settings for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelProvider {
    OpenAI {
        api_key: String,
        base_url: Option<String>, // Default: https://api.openai.com/v1
    },
    Ollama {
        base_url: Option<String>, // Default: http://localhost:11434
    },
}

impl ModelProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ModelProvider::OpenAI { .. } => ProviderKind::OpenAI,
            ModelProvider::Ollama { .. } => ProviderKind::Ollama,
        }
    }
}

/// Provider factory for creating backend adapters
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        provider: &ModelProvider,
        pricing: Arc<PricingTable>,
    ) -> Result<Box<dyn Provider>, ApiError> {
        match provider {
            ModelProvider::OpenAI { api_key, base_url } => Ok(Box::new(OpenAIProvider::new(
                api_key.clone(),
                base_url.clone(),
                pricing,
            )?)),
            ModelProvider::Ollama { base_url } => {
                Ok(Box::new(OllamaProvider::new(base_url.clone())?))
            }
        }
    }
}

/// Pick the context budget for a query.
///
/// A positive configured value wins. Otherwise the backend is asked, and its
/// answer is capped at [`MAX_DETECTED_CONTEXT_WINDOW`]; detection failures
/// fall back to [`DEFAULT_CONTEXT_WINDOW`].
pub async fn resolve_context_window(provider: &dyn Provider, model: &str, configured: u32) -> u32 {
    if configured > 0 {
        return configured;
    }

    match provider.model_context_window(model).await {
        Ok(Some(detected)) => {
            let window = detected.min(MAX_DETECTED_CONTEXT_WINDOW);
            debug!(
                provider = provider.name(),
                model, detected, window, "Auto-detected context window"
            );
            window
        }
        Ok(None) => DEFAULT_CONTEXT_WINDOW,
        Err(e) => {
            warn!(
                provider = provider.name(),
                model,
                error = %e,
                "Context window detection failed, using default"
            );
            DEFAULT_CONTEXT_WINDOW
        }
    }
}
