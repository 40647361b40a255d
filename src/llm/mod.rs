//! Streaming response generation
//!
//! A `Generator` turns one user utterance into a lazy, finite stream of text
//! fragments. No conversation history is kept between turns.

mod lines;
mod ollama;
mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::GenerationError;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

/// Ordered token fragments, ending at end-of-stream or the first error
pub type TokenStream = BoxStream<'static, Result<String, GenerationError>>;

/// Opens a response stream for one prompt
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start generating a reply to `prompt`
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::ServiceUnavailable` if the stream could not
    /// be opened
    async fn generate(&self, prompt: &str) -> Result<TokenStream, GenerationError>;
}

/// A chat message in the shape both supported APIs accept
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Build the single-turn message list
#[must_use]
pub fn build_messages(system_prompt: Option<&str>, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage {
            role: "system",
            content: system.to_string(),
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt.to_string(),
    });
    messages
}

/// Map a failed send to the right error kind
fn unavailable(service: &str, e: &reqwest::Error) -> GenerationError {
    tracing::error!(error = %e, service, "generation request failed");
    GenerationError::ServiceUnavailable(format!("{service}: {e}"))
}
