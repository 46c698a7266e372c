//! Environment source: `HEYMAN_CACHE_DAYS`, `HEYMAN_CACHE_DIR`,
//! `HEYMAN_DEFAULT_PROFILE`, and nested keys such as `HEYMAN_LOGGING__LEVEL`.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment};

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix("HEYMAN")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    ))
}
