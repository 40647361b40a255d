//! Configuration management for Parley
//!
//! Layers, lowest priority first: built-in defaults, the TOML file, the
//! environment, then CLI overrides applied by the binary.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

use self::file::ParleyConfigFile;

/// Default generation model
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Default Piper voice model
pub const DEFAULT_VOICE: &str = "en_US-lessac-medium.onnx";

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default OpenAI-compatible endpoint
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Generation service
    pub llm: LlmConfig,

    /// Capture, transcription, synthesis and playback
    pub voice: VoiceConfig,

    /// Sentence pipeline
    pub pipeline: PipelineConfig,

    /// Turn loop
    pub turn: TurnConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Generation service backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama `/api/chat` (NDJSON stream)
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions` (SSE stream)
    OpenAi,
}

/// Generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider
    pub provider: LlmProvider,

    /// Which generation model to call
    pub model_id: String,

    /// Base URL of the service
    pub base_url: String,

    /// Optional system prompt
    pub system_prompt: Option<String>,
}

/// STT backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

/// TTS backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    /// Local `piper` binary
    Piper,
    OpenAi,
    ElevenLabs,
}

/// How audio devices are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    /// In-process via cpal
    Native,
    /// External program (pw-record / pw-play and friends)
    Command,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT provider
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Self-hosted transcription endpoint, provider default when unset
    pub stt_base_url: Option<String>,

    /// TTS provider
    pub tts_provider: TtsProvider,

    /// Which synthesis voice to use
    pub voice_id: String,

    /// TTS model for hosted providers
    pub tts_model: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// Recorder backend
    pub recorder: AudioBackend,

    /// Player backend
    pub player: AudioBackend,

    /// Player program for the command backend, auto-detected when unset
    pub player_command: Option<String>,

    /// Input device name, system default when unset
    pub input_device: Option<String>,

    /// Output device name, system default when unset
    pub output_device: Option<String>,

    /// Max listen duration
    pub capture_timeout: Duration,

    /// Max utterance length once speech started
    pub phrase_limit: Duration,

    /// Ambient calibration window, zero disables calibration
    pub calibrate: Duration,

    /// Minimum RMS energy considered speech
    pub energy_threshold: f32,

    /// Watchdog for one synthesis + playback call
    pub playback_timeout: Duration,

    /// Directory for transient audio files
    pub artifact_dir: PathBuf,
}

/// Sentence pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Boundary punctuation
    pub boundaries: Vec<char>,

    /// Bounded queue between stream reader and speaker (at least 1)
    pub queue_capacity: usize,
}

/// Turn loop configuration
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Set of terminating utterances (matched case-insensitively)
    pub exit_phrases: Vec<String>,

    /// Spoken once before terminating
    pub farewell: String,

    /// Consecutive device failures tolerated before the loop gives up
    pub max_device_failures: u32,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper, TTS, chat completions)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                model_id: DEFAULT_MODEL.to_string(),
                base_url: DEFAULT_OLLAMA_URL.to_string(),
                system_prompt: None,
            },
            voice: VoiceConfig {
                stt_provider: SttProvider::Whisper,
                stt_model: "whisper-1".to_string(),
                stt_base_url: None,
                tts_provider: TtsProvider::Piper,
                voice_id: DEFAULT_VOICE.to_string(),
                tts_model: "tts-1".to_string(),
                tts_speed: 1.0,
                recorder: AudioBackend::Native,
                player: AudioBackend::Native,
                player_command: None,
                input_device: None,
                output_device: None,
                capture_timeout: Duration::from_secs(5),
                phrase_limit: Duration::from_secs(10),
                calibrate: Duration::from_secs(1),
                energy_threshold: 0.03,
                playback_timeout: Duration::from_secs(30),
                artifact_dir: std::env::temp_dir().join("parley"),
            },
            pipeline: PipelineConfig {
                boundaries: vec!['.', ',', '!', '?'],
                queue_capacity: 4,
            },
            turn: TurnConfig {
                exit_phrases: vec!["exit".to_string(), "quit".to_string(), "goodbye".to_string()],
                farewell: "Goodbye!".to_string(),
                max_device_failures: 3,
            },
            api_keys: ApiKeys::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable or the result
    /// fails validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::resolve(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge defaults, file and environment without validating
    ///
    /// Callers that apply further overrides validate afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable or a value is
    /// malformed
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let file = file::load_config_file(path)?;
        let mut config = Self::default();
        config.apply_file(file)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider or backend name is not recognized
    pub fn apply_file(&mut self, file: ParleyConfigFile) -> Result<()> {
        let ParleyConfigFile {
            llm,
            voice,
            pipeline,
            turn,
            api_keys,
        } = file;

        if let Some(provider) = llm.provider {
            self.set_llm_provider(provider.parse()?);
        }
        if let Some(model) = llm.model {
            self.llm.model_id = model;
        }
        if let Some(url) = llm.base_url {
            self.llm.base_url = url;
        }
        if llm.system_prompt.is_some() {
            self.llm.system_prompt = llm.system_prompt;
        }

        let v = &mut self.voice;
        if let Some(p) = voice.stt_provider {
            v.stt_provider = p.parse()?;
        }
        if let Some(m) = voice.stt_model {
            v.stt_model = m;
        }
        if voice.stt_base_url.is_some() {
            v.stt_base_url = voice.stt_base_url;
        }
        if let Some(p) = voice.tts_provider {
            v.tts_provider = p.parse()?;
        }
        if let Some(id) = voice.voice_id {
            v.voice_id = id;
        }
        if let Some(m) = voice.tts_model {
            v.tts_model = m;
        }
        if let Some(s) = voice.tts_speed {
            v.tts_speed = s;
        }
        if let Some(r) = voice.recorder {
            v.recorder = r.parse()?;
        }
        if let Some(p) = voice.player {
            v.player = p.parse()?;
        }
        if voice.player_command.is_some() {
            v.player_command = voice.player_command;
        }
        if voice.input_device.is_some() {
            v.input_device = voice.input_device;
        }
        if voice.output_device.is_some() {
            v.output_device = voice.output_device;
        }
        if let Some(ms) = voice.capture_timeout_ms {
            v.capture_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = voice.phrase_limit_ms {
            v.phrase_limit = Duration::from_millis(ms);
        }
        if let Some(ms) = voice.calibrate_ms {
            v.calibrate = Duration::from_millis(ms);
        }
        if let Some(t) = voice.energy_threshold {
            v.energy_threshold = t;
        }
        if let Some(ms) = voice.playback_timeout_ms {
            v.playback_timeout = Duration::from_millis(ms);
        }
        if let Some(dir) = voice.artifact_dir {
            v.artifact_dir = PathBuf::from(dir);
        }

        if let Some(b) = pipeline.boundaries {
            self.pipeline.boundaries = b.chars().filter(|c| !c.is_whitespace()).collect();
        }
        if let Some(n) = pipeline.queue_capacity {
            self.pipeline.queue_capacity = n;
        }

        if let Some(phrases) = turn.exit_phrases {
            self.turn.exit_phrases = phrases;
        }
        if let Some(f) = turn.farewell {
            self.turn.farewell = f;
        }
        if let Some(n) = turn.max_device_failures {
            self.turn.max_device_failures = n;
        }

        if api_keys.openai.is_some() {
            self.api_keys.openai = api_keys.openai;
        }
        if api_keys.deepgram.is_some() {
            self.api_keys.deepgram = api_keys.deepgram;
        }
        if api_keys.elevenlabs.is_some() {
            self.api_keys.elevenlabs = api_keys.elevenlabs;
        }

        Ok(())
    }

    /// Overlay values from the environment
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or number is malformed
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("PARLEY_LLM_PROVIDER") {
            self.set_llm_provider(provider.parse()?);
        }
        if let Some(model) = lookup("PARLEY_MODEL") {
            self.llm.model_id = model;
        }
        if let Some(url) = lookup("PARLEY_LLM_URL") {
            self.llm.base_url = url;
        } else if self.llm.provider == LlmProvider::Ollama
            && let Some(host) = lookup("OLLAMA_HOST")
        {
            self.llm.base_url = if host.starts_with("http") {
                host
            } else {
                format!("http://{host}")
            };
        }
        if let Some(voice) = lookup("PARLEY_VOICE") {
            self.voice.voice_id = voice;
        }
        if let Some(device) = lookup("PARLEY_INPUT_DEVICE") {
            self.voice.input_device = Some(device);
        }
        if let Some(device) = lookup("PARLEY_OUTPUT_DEVICE") {
            self.voice.output_device = Some(device);
        }
        if let Some(ms) = lookup("PARLEY_CAPTURE_TIMEOUT_MS") {
            let ms = ms
                .parse()
                .map_err(|_| Error::Config(format!("invalid PARLEY_CAPTURE_TIMEOUT_MS: {ms}")))?;
            self.voice.capture_timeout = Duration::from_millis(ms);
        }
        if let Some(phrases) = lookup("PARLEY_EXIT_PHRASES") {
            self.turn.exit_phrases = phrases
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.api_keys.openai = Some(key);
        }
        if let Some(key) = lookup("DEEPGRAM_API_KEY") {
            self.api_keys.deepgram = Some(key);
        }
        if let Some(key) = lookup("ELEVENLABS_API_KEY") {
            self.api_keys.elevenlabs = Some(key);
        }

        Ok(())
    }

    /// Switch provider, moving the base URL along if it is still a default
    fn set_llm_provider(&mut self, provider: LlmProvider) {
        if provider == self.llm.provider {
            return;
        }
        let url_is_default =
            self.llm.base_url == DEFAULT_OLLAMA_URL || self.llm.base_url == DEFAULT_OPENAI_URL;
        self.llm.provider = provider;
        if url_is_default {
            self.llm.base_url = match provider {
                LlmProvider::Ollama => DEFAULT_OLLAMA_URL,
                LlmProvider::OpenAi => DEFAULT_OPENAI_URL,
            }
            .to_string();
        }
    }

    /// Check ranges and required credentials
    ///
    /// # Errors
    ///
    /// Returns the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.llm.model_id.trim().is_empty() {
            return Err(Error::Config("llm model must not be empty".to_string()));
        }
        if self.pipeline.boundaries.is_empty() {
            return Err(Error::Config(
                "pipeline.boundaries must contain at least one character".to_string(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(Error::Config(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.voice.capture_timeout.is_zero() {
            return Err(Error::Config(
                "voice.capture_timeout_ms must be positive".to_string(),
            ));
        }
        if self.voice.playback_timeout.is_zero() {
            return Err(Error::Config(
                "voice.playback_timeout_ms must be positive".to_string(),
            ));
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed must be within 0.25..=4.0, got {}",
                self.voice.tts_speed
            )));
        }
        if self.turn.max_device_failures == 0 {
            return Err(Error::Config(
                "turn.max_device_failures must be at least 1".to_string(),
            ));
        }

        let missing_openai = self.api_keys.openai.as_deref().is_none_or(str::is_empty);
        if self.voice.stt_provider == SttProvider::Whisper && missing_openai {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }
        if self.voice.stt_provider == SttProvider::Deepgram
            && self.api_keys.deepgram.as_deref().is_none_or(str::is_empty)
        {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }
        if self.voice.tts_provider == TtsProvider::OpenAi && missing_openai {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }
        if self.voice.tts_provider == TtsProvider::ElevenLabs
            && self.api_keys.elevenlabs.as_deref().is_none_or(str::is_empty)
        {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown llm provider: {other}"))),
        }
    }
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown stt provider: {other}"))),
        }
    }
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "piper" => Ok(Self::Piper),
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown tts provider: {other}"))),
        }
    }
}

impl FromStr for AudioBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "cpal" => Ok(Self::Native),
            "command" => Ok(Self::Command),
            other => Err(Error::Config(format!("unknown audio backend: {other}"))),
        }
    }
}
