//! Man page retrieval
//!
//! Runs the system `man` with `MANPAGER=cat`, strips terminal formatting with
//! `col -b` when available, and normalizes what is left. Arguments are passed
//! to the child processes directly, never through a shell.

use crate::error::ApiError;
use regex::Regex;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Tool, optional manual section and question words taken from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub tool: String,
    pub section: Option<String>,
    pub question: Vec<String>,
}

impl Target {
    pub fn question_text(&self) -> String {
        self.question.join(" ")
    }
}

/// Split positional arguments into a [`Target`].
///
/// Accepted shapes:
/// - `tool question...`
/// - `<1-9> tool question...`
/// - `-s <section> tool question...`
pub fn parse_target(args: &[String]) -> Option<Target> {
    match args {
        [] => None,
        [flag, section, tool, rest @ ..] if flag == "-s" => Some(Target {
            tool: tool.clone(),
            section: Some(section.clone()),
            question: rest.to_vec(),
        }),
        [section, tool, rest @ ..] if is_section_number(section) => Some(Target {
            tool: tool.clone(),
            section: Some(section.clone()),
            question: rest.to_vec(),
        }),
        [tool, rest @ ..] => Some(Target {
            tool: tool.clone(),
            section: None,
            question: rest.to_vec(),
        }),
    }
}

fn is_section_number(arg: &str) -> bool {
    matches!(arg.as_bytes(), [b'1'..=b'9'])
}

/// Fetch and clean the man page for `tool`.
pub async fn fetch(tool: &str, section: Option<&str>) -> Result<String, ApiError> {
    if tool.is_empty() || tool.starts_with('-') {
        return Err(ApiError::ReferenceUnavailable(format!(
            "invalid command name {:?}",
            tool
        )));
    }
    let cleaner = ManPageCleaner::new()
        .map_err(|e| ApiError::ReferenceUnavailable(format!("cleanup pattern: {}", e)))?;

    let raw = match section {
        Some(section) => {
            // BSD man wants `man 3 printf`; some others only take `man -s 3 printf`
            match run_man(&[section, tool]).await {
                Ok(output) => output,
                Err(_) => run_man(&["-s", section, tool]).await.map_err(|_| {
                    ApiError::ReferenceUnavailable(format!(
                        "man page for {}({}) not found",
                        tool, section
                    ))
                })?,
            }
        }
        None => run_man(&[tool]).await.map_err(|_| {
            ApiError::ReferenceUnavailable(format!(
                "man page for {:?} not found. Try: man -k {}",
                tool, tool
            ))
        })?,
    };

    let text = strip_with_col(raw).await;
    let cleaned = cleaner.clean(&text);
    debug!(tool, bytes = cleaned.len(), "Fetched man page");
    Ok(cleaned)
}

async fn run_man(args: &[&str]) -> std::io::Result<Vec<u8>> {
    let output = Command::new("man")
        .args(args)
        .env("MANPAGER", "cat")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await?;
    if !output.status.success() || output.stdout.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("man {} exited with {}", args.join(" "), output.status),
        ));
    }
    Ok(output.stdout)
}

/// Pipe through `col -b`; the raw text is kept if `col` is missing or fails.
async fn strip_with_col(raw: Vec<u8>) -> String {
    match run_col(&raw).await {
        Ok(stripped) => stripped,
        Err(e) => {
            debug!(error = %e, "col -b unavailable, using raw man output");
            String::from_utf8_lossy(&raw).into_owned()
        }
    }
}

async fn run_col(raw: &[u8]) -> std::io::Result<String> {
    let mut child = Command::new("col")
        .arg("-b")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "col stdin"))?;
    // Feed and drain concurrently so a full stdout pipe cannot stall the write.
    let feed = async move {
        let result = stdin.write_all(raw).await;
        drop(stdin);
        result
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    fed?;
    let output = output?;
    if !output.status.success() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("col -b exited with {}", output.status),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

struct ManPageCleaner {
    ansi: Regex,
    overstrike: Regex,
    blank_runs: Regex,
}

impl ManPageCleaner {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            ansi: Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]")?,
            overstrike: Regex::new(r".\x08(.)")?,
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    fn clean(&self, content: &str) -> String {
        let content = self.ansi.replace_all(content, "");
        // `_\bx` underlines and `x\bx` bolds; keep the final glyph
        let content = self.overstrike.replace_all(&content, "$1");
        let content = content.replace("\r\n", "\n");
        let content = self.blank_runs.replace_all(&content, "\n\n");
        content.trim().to_string()
    }
}
