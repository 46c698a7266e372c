//! CLI presentation: text and json formatters per command family.

mod answer;
mod cache;
mod profile;

pub use answer::{
    format_answer_json, format_answer_text, format_dry_run, format_token_usage, format_warning,
};
pub use cache::format_cache_stats;
pub use profile::{format_model_list, format_profile_list};

use crate::error::ApiError;

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::OutputFormat(format!("JSON: {}", e)))
}

/// `1234567` -> `1,234,567`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
