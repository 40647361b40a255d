//! Streaming sentence pipeline
//!
//! Tokens flow from a [`TokenStream`](crate::llm::TokenStream) through the
//! [`SentenceSegmenter`] into a bounded queue, and out of the queue into the
//! [`SpeechSynthesisSink`] one sentence at a time:
//!
//! ```text
//! tokens ─► reader ─► segmenter ─► [queue] ─► speaker ─► synthesize ─► play
//! ```
//!
//! The reader keeps pulling from the network while the speaker is busy, up
//! to the queue capacity. Sentences are always spoken in generation order.

mod consumer;
mod segmenter;
mod sink;
mod transcript;

use std::fmt;

pub use consumer::{ResponseStreamConsumer, ResponseSummary};
pub use segmenter::SentenceSegmenter;
pub use sink::SpeechSynthesisSink;
pub use transcript::Transcript;

/// A finalized unit of text ready for synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence(String);

impl Sentence {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Text exactly as it appeared in the response
    #[must_use]
    pub fn text(&self) -> &str {
        &self.0
    }

    /// Whether there is nothing to say
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sentence {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Sentence {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}
