//! Response validation
//!
//! Turns raw model text into a command (and, in explain mode, an explanation).
//! Two output contracts are supported:
//!
//! - command-only: the answer, once code fences are stripped, must begin with
//!   the tool name; extra lines are tolerated and the first line naming the
//!   tool wins.
//! - explain: the first line naming the tool is the command and every later
//!   non-empty line belongs to the explanation.
//!
//! In both modes a refusal sentence anywhere in the text is a not-found
//! failure rather than a format failure.

use crate::prompt::REFUSAL_SENTINEL;
use thiserror::Error;

/// Commands longer than this are assumed to be runaway output.
pub const MAX_COMMAND_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("information not found in man page")]
    NotFoundInReference,

    #[error("response does not start with command '{0}'")]
    WrongPrefix(String),

    #[error("no command found in response (expected line starting with '{0}')")]
    NoCommandLine(String),

    #[error("empty response")]
    Empty,

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub command: String,
    pub explanation: Option<String>,
    pub valid: bool,
    pub error: Option<ParseError>,
}

impl ParsedResponse {
    fn valid(command: String, explanation: Option<String>) -> Self {
        Self {
            command,
            explanation,
            valid: true,
            error: None,
        }
    }

    fn invalid(error: ParseError) -> Self {
        Self {
            command: String::new(),
            explanation: None,
            valid: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseParser {
    tool: String,
    explain: bool,
}

impl ResponseParser {
    pub fn new(tool: impl Into<String>, explain: bool) -> Self {
        Self {
            tool: tool.into(),
            explain,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn explain(&self) -> bool {
        self.explain
    }

    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let text = raw.trim();
        if text.is_empty() {
            return ParsedResponse::invalid(ParseError::Empty);
        }
        if is_refusal(text) {
            return ParsedResponse::invalid(ParseError::NotFoundInReference);
        }

        if self.explain {
            self.parse_explain(text)
        } else {
            self.parse_command_only(text)
        }
    }

    fn parse_command_only(&self, text: &str) -> ParsedResponse {
        let lines: Vec<&str> = content_lines(text).collect();
        let Some(first) = lines.first() else {
            return ParsedResponse::invalid(ParseError::Empty);
        };
        if !self.names_tool(first) {
            return ParsedResponse::invalid(ParseError::WrongPrefix(self.tool.clone()));
        }

        match lines.iter().find(|line| self.names_tool(line)) {
            Some(line) => ParsedResponse::valid(line.to_string(), None),
            None => ParsedResponse::invalid(ParseError::NoCommandLine(self.tool.clone())),
        }
    }

    fn parse_explain(&self, text: &str) -> ParsedResponse {
        let mut lines = content_lines(text);
        // Preamble before the command line is discarded
        let Some(command) = lines.by_ref().find(|line| self.names_tool(line)) else {
            return ParsedResponse::invalid(ParseError::NoCommandLine(self.tool.clone()));
        };

        let explanation = lines.collect::<Vec<_>>().join("\n");
        ParsedResponse::valid(
            command.to_string(),
            (!explanation.is_empty()).then_some(explanation),
        )
    }

    fn names_tool(&self, line: &str) -> bool {
        line.split_whitespace().next() == Some(self.tool.as_str())
    }

    /// Sanity checks applied to an extracted command before it is accepted.
    pub fn validate_command(&self, command: &str) -> Result<(), ParseError> {
        let first = command
            .split_whitespace()
            .next()
            .ok_or(ParseError::Empty)?;
        if first != self.tool {
            return Err(ParseError::InvalidCommand(format!(
                "command does not start with '{}', got '{}'",
                self.tool, first
            )));
        }
        if command.contains('\n') {
            return Err(ParseError::InvalidCommand(
                "command contains newlines".to_string(),
            ));
        }
        if command.len() > MAX_COMMAND_LEN {
            return Err(ParseError::InvalidCommand(format!(
                "command suspiciously long ({} chars)",
                command.len()
            )));
        }
        Ok(())
    }
}

/// Matches the instructed refusal sentence case-insensitively, with or
/// without its leading "I".
fn is_refusal(text: &str) -> bool {
    let sentinel = REFUSAL_SENTINEL.to_lowercase();
    let core = sentinel.strip_prefix("i ").unwrap_or(&sentinel);
    text.to_lowercase().contains(core)
}

/// Trimmed non-empty lines with code-fence lines dropped and inline
/// backtick wrapping removed.
fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(strip_fence)
        .map(strip_backticks)
        .filter(|line| !line.is_empty())
}

/// A bare fence line ("```" or "```bash") carries no content; a line
/// fenced on both sides ("```ls -la```") keeps what is inside.
fn strip_fence(line: &str) -> Option<&str> {
    match line.strip_prefix("```") {
        Some(rest) => rest.strip_suffix("```").map(str::trim),
        None => Some(line),
    }
}

fn strip_backticks(line: &str) -> &str {
    let line = line.strip_prefix('`').unwrap_or(line);
    line.strip_suffix('`').unwrap_or(line).trim()
}
