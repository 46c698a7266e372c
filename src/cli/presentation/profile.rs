//! Profile and model listing presentation.

use super::to_pretty_json;
use crate::config::HeymanConfig;
use crate::error::ApiError;
use crate::provider::Model;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde_json::json;

pub fn format_profile_list(config: &HeymanConfig, format: &str) -> Result<String, ApiError> {
    let default = config.default_profile.as_deref();

    if format == "json" {
        let profiles: Vec<_> = config
            .profiles
            .iter()
            .map(|(name, profile)| {
                json!({
                    "name": name,
                    "provider": profile.provider,
                    "model": profile.model,
                    "context_window": profile.context_window_or_default(),
                    "endpoint": profile.endpoint,
                    "default": Some(name.as_str()) == default,
                })
            })
            .collect();
        return to_pretty_json(&json!({ "profiles": profiles, "total": profiles.len() }));
    }

    if config.profiles.is_empty() {
        return Ok(
            "No profiles configured.\n\nAdd a [profiles.<name>] table to the config file."
                .to_string(),
        );
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["", "Profile", "Provider", "Model", "Context", "Endpoint"]);
    for (name, profile) in &config.profiles {
        let marker = if Some(name.as_str()) == default { "*" } else { "" };
        table.add_row(vec![
            marker.to_string(),
            name.clone(),
            profile.provider.to_string(),
            profile.model.clone(),
            profile.context_window_or_default().to_string(),
            profile
                .endpoint
                .clone()
                .unwrap_or_else(|| "(default)".to_string()),
        ]);
    }
    Ok(format!("{}\n* = default profile", table))
}

pub fn format_model_list(models: &[Model], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_pretty_json(&json!({ "models": models, "total": models.len() }));
    }
    if models.is_empty() {
        return Ok("No models available.".to_string());
    }

    let price = |v: Option<f64>| v.map(|p| format!("${:.2}", p)).unwrap_or_else(|| "-".to_string());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Model", "Name", "Input / 1M", "Output / 1M"]);
    for model in models {
        table.add_row(vec![
            model.id.clone(),
            model.display_name.clone(),
            price(model.pricing.map(|p| p.input_per_million_tokens)),
            price(model.pricing.map(|p| p.output_per_million_tokens)),
        ]);
    }
    Ok(table.to_string())
}
