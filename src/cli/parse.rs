//! CLI parse: clap types for heyman. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// heyman - ask a man page a question, get back one command
#[derive(Parser, Debug)]
#[command(name = "heyman", version)]
#[command(about = "Ask a man page a question, get back one command")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Tool name (optionally preceded by a section number) and the question
    #[arg(value_name = "TOOL QUESTION")]
    pub args: Vec<String>,

    /// Manual section to look in (e.g. 3 for library calls)
    #[arg(short = 's', long)]
    pub section: Option<String>,

    /// Profile to use instead of the default
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Configuration file path (layered over the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Skip the cache lookup (answers are still cached)
    #[arg(long)]
    pub no_cache: bool,

    /// Include a short explanation after the command
    #[arg(short = 'e', long)]
    pub explain: bool,

    /// Print the answer as JSON
    #[arg(long)]
    pub json: bool,

    /// Show token usage and estimated cost
    #[arg(long)]
    pub tokens: bool,

    /// Suppress progress messages
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Show operation details on stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Show the prompt that would be sent without calling the provider
    #[arg(long)]
    pub dry_run: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show cache statistics
    CacheStats,
    /// Delete every cached answer
    ClearCache,
    /// Delete cached answers older than the configured age
    CleanCache,
    /// Show all configured profiles
    ListProfiles,
    /// Set the default profile
    SetProfile {
        /// Profile name
        name: String,
    },
    /// List models offered by the active profile's provider
    ListModels,
}
