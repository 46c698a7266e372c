//! Progress reporting on stderr for progressive queries.

use crate::executor::ProgressObserver;
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Write};
use std::sync::Mutex;
use std::time::Instant;

/// Prints query transitions to stderr.
///
/// On a terminal each status overwrites the previous one and the line is
/// cleared when the query finishes, so only the answer stays on screen.
pub struct StderrProgress {
    interactive: bool,
    state: Mutex<Option<(String, Instant)>>,
}

impl StderrProgress {
    pub fn new() -> Self {
        Self {
            interactive: std::io::stderr().is_terminal(),
            state: Mutex::new(None),
        }
    }

    fn status(&self, message: &str) {
        let mut stderr = std::io::stderr().lock();
        // Progress is cosmetic; a failed write is ignored.
        let _ = if self.interactive {
            write!(stderr, "\r\x1b[K{}", message.dimmed())
        } else {
            writeln!(stderr, "{}", message)
        };
        let _ = stderr.flush();
    }
}

impl Default for StderrProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for StderrProgress {
    fn on_request_start(&self, provider: &str, model: &str) {
        let label = format!("{} ({})", provider, model);
        self.status(&format!("Querying {}...", label));
        if let Ok(mut state) = self.state.lock() {
            *state = Some((label, Instant::now()));
        }
    }

    fn on_first_content(&self) {
        let waited = self
            .state
            .lock()
            .ok()
            .and_then(|state| state.as_ref().map(|(label, t)| (label.clone(), t.elapsed())));
        if let Some((label, elapsed)) = waited {
            self.status(&format!(
                "Receiving answer from {} after {:.1}s...",
                label,
                elapsed.as_secs_f64()
            ));
        }
    }

    fn on_complete(&self) {
        if self.interactive {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "\r\x1b[K");
            let _ = stderr.flush();
        }
        if let Ok(mut state) = self.state.lock() {
            *state = None;
        }
    }
}
