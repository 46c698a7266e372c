//! heyman: man-page-grounded command answers
//!
//! Asks a language model a question about a command-line tool, with the
//! tool's man page as the only permitted reference, and returns a single
//! validated command. Answers are cached on disk per tool, question and model.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod manpage;
pub mod parser;
pub mod pipeline;
pub mod pricing;
pub mod prompt;
pub mod provider;
