//! Cache command presentation.

use super::{group_thousands, to_pretty_json};
use crate::cache::CacheStats;
use crate::error::ApiError;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_cache_stats(
    stats: &CacheStats,
    dir: &Path,
    max_age_days: i64,
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        return to_pretty_json(&json!({
            "stats": stats,
            "cache_dir": dir,
            "max_age_days": max_age_days,
        }));
    }

    let max_age = if max_age_days > 0 {
        format!("{} days", max_age_days)
    } else {
        "never expires".to_string()
    };
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Cache Statistics", ""]);
    table.add_row(vec![
        "Total entries".to_string(),
        group_thousands(stats.total_entries as u64),
    ]);
    table.add_row(vec![
        "Total size".to_string(),
        format!("{:.2} KB", stats.total_size_bytes as f64 / 1024.0),
    ]);
    table.add_row(vec!["Total hits".to_string(), group_thousands(stats.total_hits)]);
    table.add_row(vec!["Oldest entry".to_string(), timestamp(stats.oldest_entry)]);
    table.add_row(vec!["Newest entry".to_string(), timestamp(stats.newest_entry)]);
    table.add_row(vec!["Cache directory".to_string(), dir.display().to_string()]);
    table.add_row(vec!["Max age".to_string(), max_age]);
    Ok(table.to_string())
}
