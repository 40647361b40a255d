//! Punctuation-driven sentence splitting over a growing buffer

use regex::Regex;

use super::Sentence;
use crate::{Error, Result};

/// Splits streamed text into sentences as soon as a boundary is seen
///
/// A boundary is one of the configured punctuation characters followed by
/// whitespace. The punctuation stays with its sentence and the whitespace
/// run is dropped as the separator. This is a heuristic: "Dr. Smith" and
/// "3. 5" split where a reader would not.
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    boundaries: Vec<char>,
    split: Regex,
    buffer: String,
}

impl SentenceSegmenter {
    /// Create a segmenter for the given boundary punctuation
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `boundaries` is empty
    pub fn new(boundaries: impl IntoIterator<Item = char>) -> Result<Self> {
        let mut boundaries: Vec<char> = boundaries.into_iter().collect();
        boundaries.sort_unstable();
        boundaries.dedup();
        if boundaries.is_empty() {
            return Err(Error::Config(
                "at least one sentence boundary character is required".to_string(),
            ));
        }

        let class: String = boundaries
            .iter()
            .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
            .collect();
        let split = Regex::new(&format!("[{class}]\\s+"))
            .map_err(|e| Error::Config(format!("invalid boundary set: {e}")))?;

        Ok(Self {
            boundaries,
            split,
            buffer: String::new(),
        })
    }

    /// Append a chunk and return every sentence it completed, in order
    pub fn feed(&mut self, chunk: &str) -> Vec<Sentence> {
        self.buffer.push_str(chunk);

        if !chunk.contains(self.boundaries.as_slice()) {
            return Vec::new();
        }

        let mut sentences = Vec::new();
        let mut start = 0;
        for m in self.split.find_iter(&self.buffer) {
            let punct = m.as_str().chars().next().map_or(0, char::len_utf8);
            sentences.push(Sentence::new(&self.buffer[start..m.start() + punct]));
            start = m.end();
        }

        if start > 0 {
            self.buffer.replace_range(..start, "");
        }
        sentences
    }

    /// Emit whatever is left at end-of-stream, if it is not blank
    pub fn flush(&mut self) -> Option<Sentence> {
        let rest = std::mem::take(&mut self.buffer);
        let sentence = Sentence::new(rest);
        (!sentence.is_blank()).then_some(sentence)
    }

    /// Text received since the last emitted sentence
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Drop any buffered text
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
