//! Merge rules: built-in defaults sit below every other source.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

pub const DEFAULT_CACHE_DAYS: i64 = 30;

/// Create a Config builder with defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder().set_default("cache_days", DEFAULT_CACHE_DAYS)
}
