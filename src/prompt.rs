//! Prompt construction
//!
//! Both system prompts confine the model to the supplied man page and give it
//! a fixed refusal sentence to use when the page does not cover the question.

/// Sentence the model is told to answer with when the reference is insufficient.
pub const REFUSAL_SENTINEL: &str = "I cannot find this information in the man page";

const COMMAND_ONLY_SYSTEM_PROMPT: &str = r#"You are a command-line expert helping users construct commands based ONLY on the provided man page.

CRITICAL RULES:
1. Base your answer EXCLUSIVELY on the man page content provided below
2. Ignore ALL your training data knowledge about this command
3. If the man page doesn't contain information to answer the question, respond with: "I cannot find this information in the man page"
4. Output ONLY the command, nothing else
5. Do not include explanations, descriptions, or any other text
6. Do not use markdown code blocks or formatting
7. The command must start with the command name from the man page
8. Use placeholders like <PID>, <filename> for values the user needs to provide

Example:
User asks: "how do I list open files for a process"
Man page contains: "-p <PID> selects files for a specific process"
Your response: lsof -p <PID>

Example of what NOT to do:
User asks: "how do I use feature X"
Man page does not mention feature X
WRONG response: command --feature-x (this uses your training data)
CORRECT response: I cannot find this information in the man page"#;

const EXPLAIN_SYSTEM_PROMPT: &str = r#"You are a command-line expert helping users construct commands based ONLY on the provided man page.

CRITICAL RULES:
1. Base your answer EXCLUSIVELY on the man page content provided below
2. Ignore ALL your training data knowledge about this command
3. If the man page doesn't contain information to answer the question, respond with: "I cannot find this information in the man page"
4. The command must start with the command name from the man page
5. Use placeholders like <PID>, <filename> for values the user needs to provide

Output Format (MUST follow exactly):
Line 1: The command
Line 2: (blank)
Line 3+: Brief explanation (2-4 sentences) based ONLY on the man page

Example:
User asks: "how do I list open files for a process"
Man page contains: "-p <PID> selects files for a specific process"
Your response:
lsof -p <PID>

This command lists all open files for a specific process. The -p flag specifies the process ID to inspect.

Example of what NOT to do:
User asks: "how do I use feature X"
Man page does not mention feature X
WRONG: command --feature-x (explanation from your training data)
CORRECT: I cannot find this information in the man page"#;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    tool: String,
    reference: String,
    question: String,
    explain: bool,
}

impl PromptBuilder {
    pub fn new(
        tool: impl Into<String>,
        reference: impl Into<String>,
        question: impl Into<String>,
        explain: bool,
    ) -> Self {
        Self {
            tool: tool.into(),
            reference: reference.into(),
            question: question.into(),
            explain,
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        if self.explain {
            EXPLAIN_SYSTEM_PROMPT
        } else {
            COMMAND_ONLY_SYSTEM_PROMPT
        }
    }

    pub fn user_prompt(&self) -> String {
        format!(
            "Man page for '{}':\n\n{}\n\nUser question: {}\n\nProvide the command:",
            self.tool, self.reference, self.question
        )
    }

    /// Narrower instruction sent after a malformed answer.
    pub fn strict_retry_prompt(&self) -> String {
        format!(
            "Your previous response was not a valid command. Please respond with ONLY the command syntax, starting with '{}'. No explanations, no formatting, just the command.",
            self.tool
        )
    }
}

/// Rough token count (about four characters per token).
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}
