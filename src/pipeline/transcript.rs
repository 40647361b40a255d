//! User-facing conversation transcript
//!
//! Kept apart from `tracing` output: logs go to stderr through the
//! subscriber, the transcript is what the person at the microphone reads.

use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Output {
    Stdout,
    Memory(Arc<Mutex<String>>),
    Silent,
}

/// Prints "You: …", "AI: …" and "[System] …" lines
#[derive(Debug, Clone)]
pub struct Transcript {
    output: Output,
}

impl Transcript {
    /// Print to standard output
    #[must_use]
    pub const fn stdout() -> Self {
        Self {
            output: Output::Stdout,
        }
    }

    /// Record into a shared buffer, readable through [`Transcript::contents`]
    #[must_use]
    pub fn memory() -> Self {
        Self {
            output: Output::Memory(Arc::new(Mutex::new(String::new()))),
        }
    }

    /// Discard everything
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            output: Output::Silent,
        }
    }

    pub fn user(&self, text: &str) {
        self.write(&format!("You: {text}\n"));
    }

    pub fn assistant(&self, text: &str) {
        self.write(&format!("AI: {text}\n"));
    }

    /// Open an assistant line that tokens are appended to
    pub fn assistant_begin(&self) {
        self.write("AI: ");
    }

    pub fn token(&self, token: &str) {
        self.write(token);
    }

    pub fn assistant_end(&self) {
        self.write("\n");
    }

    /// Short diagnostic for the user
    pub fn system(&self, message: &str) {
        self.write(&format!("[System] {message}\n"));
    }

    /// Everything recorded so far, empty unless created with `memory()`
    #[must_use]
    pub fn contents(&self) -> String {
        match &self.output {
            Output::Memory(buf) => buf.lock().map(|b| b.clone()).unwrap_or_default(),
            Output::Stdout | Output::Silent => String::new(),
        }
    }

    fn write(&self, text: &str) {
        match &self.output {
            Output::Stdout => {
                let mut out = std::io::stdout().lock();
                if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
                    tracing::trace!(error = %e, "transcript write to stdout failed");
                }
            }
            Output::Memory(buf) => {
                if let Ok(mut buf) = buf.lock() {
                    buf.push_str(text);
                }
            }
            Output::Silent => {}
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::stdout()
    }
}
