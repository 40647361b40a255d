//! Text-to-speech (TTS) processing

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::PlaybackError;
use crate::{Error, Result};

/// Renders one sentence of text into an audio file
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Write synthesized audio for `text` to `dest`
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::SynthesisFailed` if no audio could be produced
    async fn synthesize(&self, text: &str, dest: &Path) -> std::result::Result<(), PlaybackError>;

    /// Extension of the files this synthesizer writes
    fn file_extension(&self) -> &'static str {
        "wav"
    }
}

/// TTS provider backend
#[derive(Clone, Copy, Debug)]
enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

/// Synthesizes speech from text via a hosted API
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f64,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI` with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String, speed: f64, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAI,
        })
    }

    /// Create a new TTS instance using ElevenLabs with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            speed: 1.0, // ElevenLabs doesn't use speed in the same way
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Provider-specific request for one sentence
    fn request(&self, text: &str) -> reqwest::RequestBuilder {
        match self.provider {
            TtsProvider::OpenAI => self
                .client
                .post("https://api.openai.com/v1/audio/speech")
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "model": self.model,
                    "input": text,
                    "voice": self.voice,
                    "speed": self.speed,
                })),
            TtsProvider::ElevenLabs => self
                .client
                .post(format!(
                    "https://api.elevenlabs.io/v1/text-to-speech/{}",
                    self.voice
                ))
                .header("xi-api-key", &self.api_key)
                .json(&serde_json::json!({
                    "text": text,
                    "model_id": self.model,
                })),
        }
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str, dest: &Path) -> std::result::Result<(), PlaybackError> {
        tracing::debug!(provider = ?self.provider, chars = text.len(), "synthesizing");
        let response = self
            .request(text)
            .send()
            .await
            .map_err(|e| PlaybackError::SynthesisFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = ?self.provider, status = %status, body = %body, "TTS API error");
            return Err(PlaybackError::SynthesisFailed(format!(
                "{:?} TTS error {status}: {body}",
                self.provider
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::SynthesisFailed(e.to_string()))?;
        tokio::fs::write(dest, &audio)
            .await
            .map_err(|e| PlaybackError::SynthesisFailed(e.to_string()))
    }

    fn file_extension(&self) -> &'static str {
        "mp3"
    }
}

/// Synthesizes speech with a local `piper` binary
///
/// Text goes in on stdin, so quotes and apostrophes need no escaping.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    program: String,
    model: PathBuf,
}

impl PiperSynthesizer {
    /// Create a synthesizer for a Piper voice model
    ///
    /// # Errors
    ///
    /// Returns error if the voice model file does not exist
    pub fn new(model: impl Into<PathBuf>) -> Result<Self> {
        let model = model.into();
        if !model.exists() {
            return Err(Error::Config(format!(
                "{} not found. Download it: wget https://github.com/rhasspy/piper/releases/download/v1.0.0/en_US-lessac-medium.onnx",
                model.display()
            )));
        }
        Ok(Self {
            program: "piper".to_string(),
            model,
        })
    }

    /// Use a different executable (e.g. a full path to `piper`)
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Synthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str, dest: &Path) -> std::result::Result<(), PlaybackError> {
        let mut child = tokio::process::Command::new(&self.program)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PlaybackError::SynthesisFailed(format!("failed to spawn {}: {e}", self.program))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| PlaybackError::SynthesisFailed(format!("failed to write to piper: {e}")))?;
            // stdin dropped here so piper sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PlaybackError::SynthesisFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            tracing::debug!(stderr = %stderr, "piper stderr");
            return Err(PlaybackError::SynthesisFailed(format!(
                "piper exited with code {code}"
            )));
        }

        Ok(())
    }
}
