//! Speech-to-text (STT) processing

use async_trait::async_trait;

use crate::error::CaptureError;
use crate::{Error, Result};

/// Turns a finite WAV buffer (16 kHz mono PCM) into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one recording
    ///
    /// # Errors
    ///
    /// Returns `UnintelligibleAudio` when the service heard nothing it could
    /// write down, `Transcription` when the service itself failed
    async fn transcribe(&self, wav: &[u8]) -> std::result::Result<String, CaptureError>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug)]
enum SttProvider {
    Whisper,
    Deepgram,
}

/// Transcribes speech to text over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
            provider: SttProvider::Whisper,
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://api.deepgram.com".to_string(),
            provider: SttProvider::Deepgram,
        })
    }

    /// Point at a compatible self-hosted endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Provider-specific request for one recording
    fn request(&self, wav: &[u8]) -> Result<reqwest::RequestBuilder> {
        Ok(match self.provider {
            SttProvider::Whisper => {
                let file = reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?;
                let form = reqwest::multipart::Form::new()
                    .part("file", file)
                    .text("model", self.model.clone());
                self.client
                    .post(format!("{}/v1/audio/transcriptions", self.base_url))
                    .bearer_auth(&self.api_key)
                    .multipart(form)
            }
            SttProvider::Deepgram => self
                .client
                .post(format!(
                    "{}/v1/listen?model={}&punctuate=true",
                    self.base_url, self.model
                ))
                .header("Authorization", format!("Token {}", self.api_key))
                .header("Content-Type", "audio/wav")
                .body(wav.to_vec()),
        })
    }

    /// Send one recording and pull the transcript out of the response
    async fn fetch_transcript(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(provider = ?self.provider, audio_bytes = wav.len(), "transcribing");

        let response = self.request(wav)?.send().await.map_err(|e| {
            tracing::error!(provider = ?self.provider, error = %e, "STT request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = ?self.provider, status = %status, body = %body, "STT API error");
            return Err(Error::Audio(format!("{:?} API error {status}: {body}", self.provider)));
        }

        Ok(match self.provider {
            SttProvider::Whisper => response.json::<WhisperResponse>().await?.text,
            SttProvider::Deepgram => response
                .json::<DeepgramResponse>()
                .await?
                .results
                .channels
                .into_iter()
                .next()
                .and_then(|c| c.alternatives.into_iter().next())
                .map(|a| a.transcript)
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, wav: &[u8]) -> std::result::Result<String, CaptureError> {
        let text = self
            .fetch_transcript(wav)
            .await
            .map_err(|e| CaptureError::Transcription(e.to_string()))?;

        classify_transcript(&text)
    }
}

/// Empty or punctuation-only transcripts mean the audio was not understood
///
/// # Errors
///
/// Returns `UnintelligibleAudio` when nothing alphanumeric was recognized
pub fn classify_transcript(text: &str) -> std::result::Result<String, CaptureError> {
    let text = text.trim();
    if text.chars().any(char::is_alphanumeric) {
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text.to_string())
    } else {
        tracing::debug!(transcript = %text, "transcript empty");
        Err(CaptureError::UnintelligibleAudio)
    }
}
