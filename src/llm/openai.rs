//! OpenAI-compatible chat completions streaming client

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, Generator, TokenStream, build_messages, lines::lines, unavailable};
use crate::error::GenerationError;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Streams chat completions over server-sent events
///
/// Works against api.openai.com and any server exposing the same
/// `/v1/chat/completions` route (llama.cpp, vLLM, LM Studio).
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: Option<String>,
}

impl OpenAiGenerator {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            system_prompt: None,
        }
    }

    /// Authenticate with a bearer key
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<TokenStream, GenerationError> {
        let messages = build_messages(self.system_prompt.as_deref(), prompt);
        let request = CompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        };

        tracing::debug!(model = %self.model, "opening chat completion stream");

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| unavailable("openai", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion API error");
            return Err(GenerationError::ServiceUnavailable(format!(
                "openai error {status}: {body}"
            )));
        }

        // `[DONE]` ends the stream even if the server keeps the socket open
        let tokens = lines(response.bytes_stream().boxed())
            .map_ok(|line| parse_event(&line))
            .try_take_while(|event| futures::future::ready(Ok(!matches!(event, Event::Done))))
            .try_filter_map(|event| async move {
                match event {
                    Event::Token(token) => Ok(Some(token)),
                    Event::Failed(message) => Err(GenerationError::StreamInterrupted(message)),
                    Event::Skip | Event::Done => Ok(None),
                }
            });

        Ok(tokens.boxed())
    }
}

/// One decoded SSE line
#[derive(Debug, PartialEq, Eq)]
enum Event {
    Token(String),
    Failed(String),
    Skip,
    Done,
}

fn parse_event(line: &str) -> Event {
    let Some(data) = line.strip_prefix("data:") else {
        // comments, `event:` fields and blank separators
        return Event::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Event::Done;
    }

    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return Event::Failed(error.message);
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty())
                .map_or(Event::Skip, Event::Token)
        }
        Err(e) => Event::Failed(format!("bad completion chunk: {e}")),
    }
}
