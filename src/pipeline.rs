//! Query orchestration
//!
//! One query runs: cache lookup, dispatch through the executor, validation,
//! at most one strict retry, then a best-effort cache write of whichever
//! response validated.

use crate::cache::CacheStore;
use crate::error::ApiError;
use crate::executor::{execute, ExecutionMode, NoopObserver, ProgressObserver};
use crate::parser::{ParseError, ParsedResponse, ResponseParser};
use crate::prompt::estimate_tokens;
use crate::provider::{Provider, QueryRequest, QueryResponse};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything needed to answer one question
#[derive(Debug, Clone)]
pub struct QueryInput {
    pub tool: String,
    pub question: String,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    /// Extra instruction appended to the user prompt on a strict retry
    pub retry_prompt: String,
    pub explain: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub context_window: u32,
    /// Skip the cache lookup; a validated answer is still written back.
    pub bypass_cache: bool,
    pub mode: ExecutionMode,
}

impl QueryInput {
    fn request(&self) -> QueryRequest {
        QueryRequest::new(&self.model, &self.system_prompt, &self.user_prompt)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_context_window(self.context_window)
    }
}

const RETRY_STOP: &str = "\n\n";

/// Advisory conditions that did not stop the query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    ContextOverrun { estimated: u32, budget: u32 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ContextOverrun { estimated, budget } => write!(
                f,
                "Prompt (~{} tokens) exceeds the {} token context window",
                estimated, budget
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub parsed: ParsedResponse,
    /// The response that validated (the retry's, if one was needed)
    pub response: QueryResponse,
    pub retried: bool,
    pub warnings: Vec<Warning>,
}

pub struct QueryPipeline {
    provider: Arc<dyn Provider>,
    cache: Option<CacheStore>,
    observer: Arc<dyn ProgressObserver>,
}

impl QueryPipeline {
    pub fn new(provider: Arc<dyn Provider>, cache: Option<CacheStore>) -> Self {
        Self {
            provider,
            cache,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub async fn run(
        &self,
        input: &QueryInput,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, ApiError> {
        let warnings = context_warnings(input);
        let parser = ResponseParser::new(&input.tool, input.explain);

        let response = match self.lookup(input) {
            Some(hit) => hit,
            None => {
                execute(
                    self.provider.as_ref(),
                    input.request(),
                    input.mode,
                    self.observer.as_ref(),
                    cancel,
                )
                .await?
            }
        };

        let parsed = validate(&parser, &response.content);
        if parsed.valid {
            if !response.cached {
                self.store(input, &response);
            }
            return Ok(QueryOutcome {
                parsed,
                response,
                retried: false,
                warnings,
            });
        }

        let error = parse_error(&parsed);
        if response.cached {
            // A cached answer cannot change by asking again.
            return Err(ApiError::CachedResponseInvalid(error.to_string()));
        }

        warn!(
            tool = %input.tool,
            model = %input.model,
            error = %error,
            "Response failed validation, retrying with strict prompt"
        );
        let mut retry_request = input.request().with_user_prompt(format!(
            "{}\n\n{}",
            input.user_prompt, input.retry_prompt
        ));
        if !input.explain {
            // A strict command-only answer ends at the first blank line
            retry_request = retry_request.with_stop_sequences(vec![RETRY_STOP.to_string()]);
        }
        let retry_response = execute(
            self.provider.as_ref(),
            retry_request,
            ExecutionMode::Blocking,
            &NoopObserver,
            cancel,
        )
        .await?;

        let parsed = validate(&parser, &retry_response.content);
        if !parsed.valid {
            return Err(match parse_error(&parsed) {
                ParseError::NotFoundInReference => ApiError::NotFoundInReference,
                other => ApiError::RetryFailed(other.to_string()),
            });
        }

        self.store(input, &retry_response);
        Ok(QueryOutcome {
            parsed,
            response: retry_response,
            retried: true,
            warnings,
        })
    }

    fn lookup(&self, input: &QueryInput) -> Option<QueryResponse> {
        if input.bypass_cache {
            return None;
        }
        let cache = self.cache.as_ref()?;
        match cache.get(&input.tool, &input.question, &input.model) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, querying provider");
                None
            }
        }
    }

    /// Best-effort: the answer is returned whether or not it was cached.
    fn store(&self, input: &QueryInput, response: &QueryResponse) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.set(&input.tool, &input.question, &input.model, response) {
            Ok(()) => debug!(tool = %input.tool, model = %input.model, "Cached response"),
            Err(e) => warn!(error = %e, "Failed to cache response"),
        }
    }
}

fn context_warnings(input: &QueryInput) -> Vec<Warning> {
    let estimated = estimate_tokens(&input.user_prompt);
    if input.context_window > 0 && estimated > input.context_window {
        warn!(
            estimated,
            budget = input.context_window,
            "Prompt exceeds context window"
        );
        vec![Warning::ContextOverrun {
            estimated,
            budget: input.context_window,
        }]
    } else {
        Vec::new()
    }
}

/// Parse, then apply the command sanity checks to a successful parse.
fn validate(parser: &ResponseParser, content: &str) -> ParsedResponse {
    let parsed = parser.parse(content);
    if !parsed.valid {
        return parsed;
    }
    match parser.validate_command(&parsed.command) {
        Ok(()) => parsed,
        Err(e) => ParsedResponse {
            command: String::new(),
            explanation: None,
            valid: false,
            error: Some(e),
        },
    }
}

fn parse_error(parsed: &ParsedResponse) -> ParseError {
    parsed.error.clone().unwrap_or(ParseError::Empty)
}
