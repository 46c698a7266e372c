//! CLI domain: parse, route, output, and presentation only.
//! Query orchestration lives in the pipeline; the route table only wires it up.

mod output;
mod parse;
mod presentation;
mod progress;
mod route;

pub use output::{exit_code, map_error};
pub use parse::{Cli, Commands};
pub use presentation::{
    format_answer_json, format_answer_text, format_cache_stats, format_dry_run,
    format_model_list, format_profile_list, format_token_usage, format_warning,
};
pub use progress::StderrProgress;
pub use route::RunContext;
