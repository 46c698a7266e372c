//! Versioned model pricing lookup.
//!
//! Built once per process and handed to whatever needs cost figures. Prices
//! change without notice, so every figure derived from this table is an
//! estimate tied to [`PricingTable::last_updated`].

use crate::provider::Pricing;
use chrono::NaiveDate;
use std::collections::HashMap;

const OPENAI_PRICING_URL: &str = "https://openai.com/api/pricing/";
const ANTHROPIC_PRICING_URL: &str = "https://www.anthropic.com/pricing";

/// Per-model rates in dollars per million tokens
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPricing {
    pub provider: String,
    pub model: String,
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub pricing_url: String,
}

impl ModelPricing {
    pub fn cost(&self, tokens_input: u32, tokens_output: u32) -> f64 {
        f64::from(tokens_input) / 1_000_000.0 * self.input_per_million
            + f64::from(tokens_output) / 1_000_000.0 * self.output_per_million
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            input_per_million_tokens: self.input_per_million,
            output_per_million_tokens: self.output_per_million,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    last_updated: NaiveDate,
    models: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new(last_updated: NaiveDate, models: impl IntoIterator<Item = ModelPricing>) -> Self {
        Self {
            last_updated,
            models: models.into_iter().map(|m| (m.model.clone(), m)).collect(),
        }
    }

    /// The table shipped with this release.
    pub fn builtin() -> Self {
        let entry = |provider: &str, model: &str, input: f64, output: f64, url: &str| {
            ModelPricing {
                provider: provider.to_string(),
                model: model.to_string(),
                input_per_million: input,
                output_per_million: output,
                pricing_url: url.to_string(),
            }
        };

        Self::new(
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap_or_default(),
            [
                entry("openai", "gpt-4o", 2.50, 10.00, OPENAI_PRICING_URL),
                entry("openai", "gpt-4o-mini", 0.15, 0.60, OPENAI_PRICING_URL),
                entry("openai", "gpt-4-turbo", 10.00, 30.00, OPENAI_PRICING_URL),
                entry("openai", "gpt-4", 30.00, 60.00, OPENAI_PRICING_URL),
                entry("openai", "gpt-3.5-turbo", 0.50, 1.50, OPENAI_PRICING_URL),
                entry(
                    "anthropic",
                    "claude-opus-4-5-20251101",
                    15.00,
                    75.00,
                    ANTHROPIC_PRICING_URL,
                ),
                entry(
                    "anthropic",
                    "claude-sonnet-4-5-20250924",
                    3.00,
                    15.00,
                    ANTHROPIC_PRICING_URL,
                ),
                entry(
                    "anthropic",
                    "claude-3-5-sonnet-20241022",
                    3.00,
                    15.00,
                    ANTHROPIC_PRICING_URL,
                ),
                entry(
                    "anthropic",
                    "claude-3-5-haiku-20241022",
                    0.80,
                    4.00,
                    ANTHROPIC_PRICING_URL,
                ),
            ],
        )
    }

    pub fn last_updated(&self) -> NaiveDate {
        self.last_updated
    }

    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    /// Estimated dollar cost, or `None` for models without a price (local models).
    pub fn cost(&self, model: &str, tokens_input: u32, tokens_output: u32) -> Option<f64> {
        self.get(model)
            .map(|pricing| pricing.cost(tokens_input, tokens_output))
    }
}
