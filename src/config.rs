//! Configuration System
//!
//! Layered configuration for profiles, cache policy and logging. Sources, in
//! increasing precedence: built-in defaults, the global config file, an
//! explicit `--config` file, then `HEYMAN_*` environment variables.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::provider::{ModelProvider, ProviderKind, DEFAULT_CONTEXT_WINDOW};
use config::{File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod merge_policy;
mod paths;
mod sources;

pub use merge_policy::DEFAULT_CACHE_DAYS;
pub use paths::{default_cache_dir, default_config_path, default_log_path};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeymanConfig {
    /// Profile used when neither `--profile` nor `HEYMAN_PROFILE` is given
    #[serde(default)]
    pub default_profile: Option<String>,

    /// Maximum cache entry age in days; 0 or less never expires
    #[serde(default = "default_cache_days")]
    pub cache_days: i64,

    /// Cache directory override (`HEYMAN_CACHE_DIR`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_cache_days() -> i64 {
    DEFAULT_CACHE_DAYS
}

impl Default for HeymanConfig {
    fn default() -> Self {
        Self {
            default_profile: None,
            cache_days: DEFAULT_CACHE_DAYS,
            cache_dir: None,
            profiles: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// One named backend + model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub provider: ProviderKind,

    pub model: String,

    /// Context budget in tokens; 0 means detect or use the default
    #[serde(default)]
    pub context_window: u32,

    /// Base URL override for the backend API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    2000
}

impl Profile {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            context_window: 0,
            endpoint: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Configured context window, or the default when unset.
    pub fn context_window_or_default(&self) -> u32 {
        if self.context_window > 0 {
            self.context_window
        } else {
            DEFAULT_CONTEXT_WINDOW
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Connection settings from the process environment
    /// (`OPENAI_API_KEY`, `OLLAMA_HOST`).
    pub fn model_provider(&self) -> ModelProvider {
        self.model_provider_with(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Connection settings using `lookup` for environment values.
    ///
    /// A profile `endpoint` wins over `OLLAMA_HOST`.
    pub fn model_provider_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ModelProvider {
        match self.provider {
            ProviderKind::OpenAI => ModelProvider::OpenAI {
                api_key: lookup("OPENAI_API_KEY").unwrap_or_default(),
                base_url: self.endpoint.clone(),
            },
            ProviderKind::Ollama => ModelProvider::Ollama {
                base_url: self.endpoint.clone().or_else(|| lookup("OLLAMA_HOST")),
            },
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Profile(String, String),
    DefaultProfile(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Profile(name, msg) => write!(f, "Profile '{}': {}", name, msg),
            ValidationError::DefaultProfile(name) => {
                write!(f, "Default profile '{}' is not defined", name)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl HeymanConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors: Vec<ValidationError> = self
            .profiles
            .iter()
            .filter_map(|(name, profile)| {
                profile
                    .validate()
                    .err()
                    .map(|e| ValidationError::Profile(name.clone(), e))
            })
            .collect();

        if let Some(default) = &self.default_profile {
            if !self.profiles.contains_key(default) {
                errors.push(ValidationError::DefaultProfile(default.clone()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve the active profile: `flag` > `HEYMAN_PROFILE` > `default_profile`.
    pub fn active_profile(&self, flag: Option<&str>) -> Result<(String, &Profile), ApiError> {
        let env = std::env::var("HEYMAN_PROFILE")
            .ok()
            .filter(|v| !v.is_empty());
        self.resolve_profile(flag, env.as_deref())
    }

    pub fn resolve_profile(
        &self,
        flag: Option<&str>,
        env: Option<&str>,
    ) -> Result<(String, &Profile), ApiError> {
        let name = flag
            .or(env)
            .or(self.default_profile.as_deref())
            .ok_or_else(|| {
                ApiError::ConfigError(
                    "No profile specified and no default profile set".to_string(),
                )
            })?;

        self.profiles
            .get(name)
            .map(|profile| (name.to_string(), profile))
            .ok_or_else(|| ApiError::ConfigError(format!("Profile '{}' not found", name)))
    }

    /// `cache_dir` override, else the platform cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf, ApiError> {
        self.cache_dir
            .clone()
            .or_else(default_cache_dir)
            .ok_or_else(|| {
                ApiError::ConfigError(
                    "Cannot determine cache directory; set HEYMAN_CACHE_DIR".to_string(),
                )
            })
    }
}

/// Loads and saves [`HeymanConfig`]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load every layer; `explicit` is a `--config` file that must exist.
    pub fn load(explicit: Option<&Path>) -> Result<HeymanConfig, ApiError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = sources::environment::add_to_builder(builder)?;

        Self::finish(builder.build()?)
    }

    /// Load a single file over the defaults, ignoring other sources.
    pub fn load_from_file(path: &Path) -> Result<HeymanConfig, ApiError> {
        let settings = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .build()?;
        Self::finish(settings)
    }

    fn finish(settings: config::Config) -> Result<HeymanConfig, ApiError> {
        let config: HeymanConfig = settings.try_deserialize()?;
        config.validate().map_err(|errors| {
            ApiError::ConfigError(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        Ok(config)
    }

    /// File that writes go to: the explicit path, else the global config file.
    pub fn target_path(explicit: Option<&Path>) -> Result<PathBuf, ApiError> {
        explicit
            .map(Path::to_path_buf)
            .or_else(default_config_path)
            .ok_or_else(|| {
                ApiError::ConfigError("Cannot determine configuration file path".to_string())
            })
    }

    /// Write `config` as TOML, creating parent directories.
    pub fn save(config: &HeymanConfig, path: &Path) -> Result<(), ApiError> {
        let serialized = toml::to_string_pretty(config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ApiError::ConfigError(format!(
                    "Failed to create config directory {:?}: {}",
                    parent, e
                ))
            })?;
        }
        std::fs::write(path, serialized).map_err(|e| {
            ApiError::ConfigError(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
