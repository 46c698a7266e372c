//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ProviderNotConfigured(_) => format!(
            "{}\nSet the provider's credentials (e.g. export OPENAI_API_KEY=sk-...)",
            e
        ),
        ApiError::ConfigError(msg) if msg.contains("profile") => format!(
            "{}\nAdd a [profiles.<name>] table to the config file and run 'heyman set-profile <name>'",
            e
        ),
        ApiError::NotFoundInReference => {
            format!("{}\nTry rephrasing the question or a different section", e)
        }
        e if e.is_transport() => format!(
            "{}\nCheck that the backend is reachable and serves this model ('heyman list-models')",
            e
        ),
        _ => e.to_string(),
    }
}

/// Process exit status for an error: 2 for usage and configuration problems,
/// 130 for an interrupted query, 1 otherwise.
pub fn exit_code(e: &ApiError) -> i32 {
    match e {
        ApiError::InvalidArguments(_)
        | ApiError::ConfigError(_)
        | ApiError::UnsupportedProvider(_)
        | ApiError::ProviderNotConfigured(_) => 2,
        ApiError::Cancelled => 130,
        _ => 1,
    }
}
