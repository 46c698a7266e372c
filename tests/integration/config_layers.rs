//! Integration tests for layered configuration loading

use super::test_utils::lock_env;
use heyman::config::{default_config_path, ConfigLoader, HeymanConfig, Profile};
use heyman::error::ApiError;
use heyman::provider::{ModelProvider, ProviderKind};
use std::path::Path;
use tempfile::TempDir;

/// Restores the listed variables when dropped
struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        let saved = vars
            .iter()
            .map(|(name, value)| {
                let old = std::env::var(name).ok();
                std::env::set_var(name, value);
                (*name, old)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, old) in &self.saved {
            match old {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

fn write(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[test]
fn test_layers_apply_in_order() {
    let _lock = lock_env();
    let temp = TempDir::new().unwrap();
    let _env = EnvGuard::set(&[
        ("XDG_CONFIG_HOME", temp.path().join("xdg").to_str().unwrap()),
        ("HEYMAN_DEFAULT_PROFILE", "cloud"),
    ]);

    let global = default_config_path().unwrap();
    assert!(global.starts_with(temp.path()));
    write(
        &global,
        r#"
default_profile = "local"
cache_days = 14

[profiles.local]
provider = "ollama"
model = "llama3:8b"

[profiles.cloud]
provider = "openai"
model = "gpt-4o-mini"
"#,
    );

    let explicit = temp.path().join("override.toml");
    write(&explicit, "cache_days = 2\n");

    let config = ConfigLoader::load(Some(&explicit)).unwrap();
    // explicit file beats the global file
    assert_eq!(config.cache_days, 2);
    // environment beats both
    assert_eq!(config.default_profile.as_deref(), Some("cloud"));
    // tables from the global file survive
    assert_eq!(config.profiles.len(), 2);

    let (name, profile) = config.resolve_profile(None, None).unwrap();
    assert_eq!(name, "cloud");
    assert_eq!(profile.provider, ProviderKind::OpenAI);
}

#[test]
fn test_no_config_anywhere_gives_defaults() {
    let _lock = lock_env();
    let temp = TempDir::new().unwrap();
    let _env = EnvGuard::set(&[("XDG_CONFIG_HOME", temp.path().to_str().unwrap())]);

    let config = ConfigLoader::load(None).unwrap();
    assert_eq!(config.cache_days, 30);
    assert!(config.profiles.is_empty());
    assert!(matches!(
        config.active_profile(None),
        Err(ApiError::ConfigError(_))
    ));
}

#[test]
fn test_saved_profile_round_trips_through_loader() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");

    let mut config = HeymanConfig::default();
    let mut profile = Profile::new(ProviderKind::Ollama, "qwen2.5-coder:7b");
    profile.endpoint = Some("http://gpu-box:11434".to_string());
    profile.context_window = 16384;
    config.profiles.insert("coder".to_string(), profile);
    config.default_profile = Some("coder".to_string());
    ConfigLoader::save(&config, &path).unwrap();

    let loaded = ConfigLoader::load_from_file(&path).unwrap();
    let (_, profile) = loaded.resolve_profile(None, None).unwrap();
    assert_eq!(profile.context_window_or_default(), 16384);
    assert_eq!(
        profile.model_provider_with(|_| None),
        ModelProvider::Ollama {
            base_url: Some("http://gpu-box:11434".to_string())
        }
    );
}

#[test]
fn test_default_profile_must_exist() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    write(&path, "default_profile = \"ghost\"\n");

    let err = ConfigLoader::load_from_file(&path).unwrap_err();
    assert!(matches!(err, ApiError::ConfigError(msg) if msg.contains("ghost")));
}
