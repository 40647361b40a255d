//! Ollama `/api/chat` streaming client

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, Generator, TokenStream, build_messages, lines::lines, unavailable};
use crate::error::GenerationError;

/// One NDJSON line of an Ollama chat stream
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Streams chat replies from a local or remote Ollama server
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: Option<String>,
}

impl OllamaGenerator {
    /// Create a generator for `model` served at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            system_prompt: None,
        }
    }

    /// Send a system prompt ahead of every user prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<TokenStream, GenerationError> {
        let messages = build_messages(self.system_prompt.as_deref(), prompt);
        let request = OllamaRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        };

        tracing::debug!(model = %self.model, "opening ollama stream");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable("ollama", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "ollama API error");
            return Err(GenerationError::ServiceUnavailable(format!(
                "ollama error {status}: {body}"
            )));
        }

        let tokens = lines(response.bytes_stream().boxed())
            .try_filter_map(|line| async move { parse_line(&line) });

        Ok(tokens.boxed())
    }
}

/// Decode one NDJSON line into an optional token
///
/// Blank lines, empty fragments and the final `done` record yield nothing.
fn parse_line(line: &str) -> Result<Option<String>, GenerationError> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let chunk: OllamaChunk = serde_json::from_str(line)
        .map_err(|e| GenerationError::StreamInterrupted(format!("bad ollama chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(GenerationError::StreamInterrupted(error));
    }

    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    if content.is_empty() {
        if chunk.done {
            tracing::trace!("ollama stream done");
        }
        return Ok(None);
    }

    Ok(Some(content))
}
