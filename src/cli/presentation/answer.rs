//! Answer presentation: the command itself, token usage, warnings, dry runs.

use super::{group_thousands, to_pretty_json};
use crate::error::ApiError;
use crate::parser::ParsedResponse;
use crate::pipeline::Warning;
use crate::pricing::ModelPricing;
use crate::provider::{ProviderKind, QueryResponse};
use chrono::NaiveDate;
use owo_colors::OwoColorize;
use serde::Serialize;

#[derive(Serialize)]
struct AnswerJson<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<&'a str>,
    metadata: AnswerMetadata<'a>,
}

#[derive(Serialize)]
struct AnswerMetadata<'a> {
    provider: &'a str,
    model: &'a str,
    tokens_input: u32,
    tokens_output: u32,
    cached: bool,
    /// Absent when the model has no pricing data (local models)
    #[serde(skip_serializing_if = "Option::is_none")]
    cost: Option<f64>,
}

/// Command, then a blank line and the explanation when one was requested.
pub fn format_answer_text(parsed: &ParsedResponse, explain: bool) -> String {
    match (&parsed.explanation, explain) {
        (Some(explanation), true) if !explanation.is_empty() => {
            format!("{}\n\n{}", parsed.command, explanation)
        }
        _ => parsed.command.clone(),
    }
}

pub fn format_answer_json(
    parsed: &ParsedResponse,
    response: &QueryResponse,
    cost: Option<f64>,
) -> Result<String, ApiError> {
    to_pretty_json(&AnswerJson {
        command: &parsed.command,
        explanation: parsed.explanation.as_deref().filter(|e| !e.is_empty()),
        metadata: AnswerMetadata {
            provider: &response.provider,
            model: &response.model,
            tokens_input: response.tokens_input,
            tokens_output: response.tokens_output,
            cached: response.cached,
            cost,
        },
    })
}

pub fn format_token_usage(
    response: &QueryResponse,
    pricing: Option<&ModelPricing>,
    last_updated: NaiveDate,
) -> String {
    let input = u64::from(response.tokens_input);
    let output = u64::from(response.tokens_output);
    let mut s = String::from("Token usage:\n");
    s.push_str(&format!("  Input:  {} tokens\n", group_thousands(input)));
    s.push_str(&format!("  Output: {} tokens\n", group_thousands(output)));
    s.push_str(&format!("  Total:  {} tokens\n", group_thousands(input + output)));

    match pricing {
        Some(pricing) => {
            let cost = pricing.cost(response.tokens_input, response.tokens_output);
            s.push_str(&format!(
                "  Cost:   ${:.4} (estimated, based on {} pricing)\n\n",
                cost,
                last_updated.format("%Y-%m-%d")
            ));
            s.push_str(&format!(
                "{}\n    {}",
                "Pricing may have changed. Check current rates:".yellow(),
                pricing.pricing_url
            ));
        }
        None if response.provider == ProviderKind::Ollama.as_str() => {
            s.push_str("  Cost:   Free (Ollama)");
        }
        None => s.push_str("  Cost:   Unknown (no pricing data for this model)"),
    }
    s
}

pub fn format_warning(warning: &Warning) -> String {
    let mut s = format!("{} {}", "Warning:".yellow().bold(), warning);
    if let Warning::ContextOverrun { .. } = warning {
        s.push_str("\n    Try a more specific section: heyman <section> <tool> <question>");
    }
    s
}

/// Prompt preview for `--dry-run`.
pub fn format_dry_run(
    system_prompt: &str,
    user_prompt: &str,
    estimated_tokens: u32,
    context_window: u32,
) -> String {
    format!(
        "{}\n{}\n\n{}\n{}\n\n{} ~{} tokens (context window {})",
        "=== System prompt ===".bold(),
        system_prompt,
        "=== User prompt ===".bold(),
        user_prompt,
        "Estimated prompt size:".bold(),
        estimated_tokens,
        context_window
    )
}
