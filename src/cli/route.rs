//! CLI route: single route table and run context. Dispatches to the query
//! pipeline, the cache and the config layer, then hands results to presentation.

use crate::cache::CacheStore;
use crate::cli::parse::{Cli, Commands};
use crate::cli::presentation::{
    format_answer_json, format_answer_text, format_cache_stats, format_dry_run,
    format_model_list, format_profile_list, format_token_usage, format_warning,
};
use crate::cli::progress::StderrProgress;
use crate::config::{ConfigLoader, HeymanConfig, Profile};
use crate::error::ApiError;
use crate::executor::ExecutionMode;
use crate::manpage::{self, Target};
use crate::pipeline::{QueryInput, QueryOutcome, QueryPipeline};
use crate::pricing::PricingTable;
use crate::prompt::{estimate_tokens, PromptBuilder};
use crate::provider::{resolve_context_window, Provider, ProviderFactory};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runtime context for CLI execution: loaded configuration and pricing data.
pub struct RunContext {
    config: HeymanConfig,
    config_path: Option<PathBuf>,
    pricing: Arc<PricingTable>,
}

impl RunContext {
    /// Load every configuration layer; `config_path` is the `--config` file.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Ok(Self::with_config(config, config_path))
    }

    pub fn with_config(config: HeymanConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            pricing: Arc::new(PricingTable::builtin()),
        }
    }

    pub fn config(&self) -> &HeymanConfig {
        &self.config
    }

    /// Execute a CLI invocation via the single route table.
    pub async fn execute(&self, cli: &Cli, cancel: &CancellationToken) -> Result<String, ApiError> {
        let format = if cli.json { "json" } else { "text" };
        match &cli.command {
            Some(Commands::CacheStats) => {
                let cache = self.cache_store()?;
                let stats = cache.stats()?;
                format_cache_stats(&stats, cache.dir(), cache.max_age_days(), format)
            }
            Some(Commands::ClearCache) => {
                let removed = self.cache_store()?.clear()?;
                info!(removed, "Cleared cache");
                Ok(format!("Cleared {} cached entries", removed))
            }
            Some(Commands::CleanCache) => {
                let cache = self.cache_store()?;
                let removed = cache.clean_expired()?;
                info!(removed, "Removed expired cache entries");
                if cache.max_age_days() > 0 {
                    Ok(format!(
                        "Removed {} expired entries (older than {} days)",
                        removed,
                        cache.max_age_days()
                    ))
                } else {
                    Ok("Cache entries never expire (cache_days <= 0); nothing removed".to_string())
                }
            }
            Some(Commands::ListProfiles) => format_profile_list(&self.config, format),
            Some(Commands::SetProfile { name }) => self.set_profile(name),
            Some(Commands::ListModels) => {
                let (_, profile) = self.config.active_profile(cli.profile.as_deref())?;
                let provider = self.provider_for(profile)?;
                let models = cancellable(cancel, provider.available_models()).await?;
                format_model_list(&models, format)
            }
            None => self.handle_query(cli, cancel).await,
        }
    }

    async fn handle_query(&self, cli: &Cli, cancel: &CancellationToken) -> Result<String, ApiError> {
        let target = target_from(cli)?;
        let question = target.question_text();
        let (profile_name, profile) = self.config.active_profile(cli.profile.as_deref())?;

        note(cli, format!("Command: {}", target.tool));
        if let Some(section) = &target.section {
            note(cli, format!("Section: {}", section));
        }
        note(cli, format!("Question: {}", question));
        note(
            cli,
            format!(
                "Using profile: {} ({} {})",
                profile_name, profile.provider, profile.model
            ),
        );

        let reference =
            cancellable(cancel, manpage::fetch(&target.tool, target.section.as_deref())).await?;
        note(cli, format!("Man page size: {} bytes", reference.len()));

        let prompts = PromptBuilder::new(&target.tool, reference, &question, cli.explain);
        let user_prompt = prompts.user_prompt();

        if cli.dry_run {
            return Ok(format_dry_run(
                prompts.system_prompt(),
                &user_prompt,
                estimate_tokens(&user_prompt),
                profile.context_window_or_default(),
            ));
        }

        let provider = self.provider_for(profile)?;
        let context_window = cancellable(cancel, async {
            Ok::<_, ApiError>(
                resolve_context_window(provider.as_ref(), &profile.model, profile.context_window)
                    .await,
            )
        })
        .await?;
        note(cli, format!("Context window: {} tokens", context_window));

        // Progress output would interleave with the verbose notes
        let mode = if cli.quiet || cli.verbose {
            ExecutionMode::Blocking
        } else {
            ExecutionMode::Progressive
        };
        let mut pipeline = QueryPipeline::new(provider, self.open_cache(cli));
        if mode == ExecutionMode::Progressive {
            pipeline = pipeline.with_observer(Arc::new(StderrProgress::new()));
        }

        let input = QueryInput {
            tool: target.tool.clone(),
            question,
            model: profile.model.clone(),
            system_prompt: prompts.system_prompt().to_string(),
            user_prompt,
            retry_prompt: prompts.strict_retry_prompt(),
            explain: cli.explain,
            max_tokens: profile.max_tokens,
            temperature: profile.temperature,
            context_window,
            bypass_cache: cli.no_cache,
            mode,
        };
        let outcome = pipeline.run(&input, cancel).await?;

        for warning in &outcome.warnings {
            eprintln!("{}", format_warning(warning));
        }
        if outcome.response.cached {
            note(cli, "Found in cache".to_string());
        }
        if outcome.retried {
            note(cli, "First answer failed validation; used the strict retry".to_string());
        }

        self.render_answer(cli, &outcome)
    }

    fn render_answer(&self, cli: &Cli, outcome: &QueryOutcome) -> Result<String, ApiError> {
        let response = &outcome.response;
        if cli.json {
            let cost = self
                .pricing
                .cost(&response.model, response.tokens_input, response.tokens_output);
            return format_answer_json(&outcome.parsed, response, cost);
        }

        let mut out = format_answer_text(&outcome.parsed, cli.explain);
        if cli.tokens {
            out.push_str("\n\n");
            out.push_str(&format_token_usage(
                response,
                self.pricing.get(&response.model),
                self.pricing.last_updated(),
            ));
        }
        Ok(out)
    }

    fn provider_for(&self, profile: &Profile) -> Result<Arc<dyn Provider>, ApiError> {
        let client =
            ProviderFactory::create_client(&profile.model_provider(), Arc::clone(&self.pricing))?;
        Ok(Arc::from(client))
    }

    fn cache_store(&self) -> Result<CacheStore, ApiError> {
        Ok(CacheStore::new(self.config.cache_dir()?, self.config.cache_days)?)
    }

    /// A cache that cannot be opened downgrades the query to uncached.
    fn open_cache(&self, cli: &Cli) -> Option<CacheStore> {
        match self.cache_store() {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Cache unavailable, continuing without it");
                note(cli, format!("Warning: cache unavailable: {}", e));
                None
            }
        }
    }

    /// Make `name` the default profile in the config file that is written to.
    fn set_profile(&self, name: &str) -> Result<String, ApiError> {
        let path = ConfigLoader::target_path(self.config_path.as_deref())?;
        let mut file_config = if path.exists() {
            ConfigLoader::load_from_file(&path)?
        } else {
            HeymanConfig::default()
        };

        let Some(profile) = file_config.profiles.get(name).cloned() else {
            let available: Vec<&str> = file_config.profiles.keys().map(String::as_str).collect();
            return Err(ApiError::ConfigError(format!(
                "Profile '{}' not found in {}. Available profiles: {}",
                name,
                path.display(),
                if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                }
            )));
        };

        file_config.default_profile = Some(name.to_string());
        ConfigLoader::save(&file_config, &path)?;
        debug!(profile = name, path = %path.display(), "Saved default profile");

        Ok(format!(
            "Default profile set to: {}\n  Provider: {}\n  Model:    {}",
            name, profile.provider, profile.model
        ))
    }
}

fn target_from(cli: &Cli) -> Result<Target, ApiError> {
    let mut target = manpage::parse_target(&cli.args)
        .ok_or_else(|| ApiError::InvalidArguments("no command specified".to_string()))?;
    if cli.section.is_some() {
        target.section = cli.section.clone();
    }
    if target.question.is_empty() {
        return Err(ApiError::InvalidArguments(format!(
            "no question specified. Usage: heyman {} <question>",
            target.tool
        )));
    }
    Ok(target)
}

/// Operation details for `--verbose`, kept off stdout.
fn note(cli: &Cli, message: String) {
    if cli.verbose {
        eprintln!("{}", message);
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = fut => result,
    }
}
