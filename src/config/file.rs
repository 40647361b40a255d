//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Generation service configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Sentence pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Turn loop configuration
    #[serde(default)]
    pub turn: TurnFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Provider ("ollama" or "openai")
    pub provider: Option<String>,

    /// Model identifier (e.g. "llama3.2")
    pub model: Option<String>,

    /// Base URL of the generation service
    pub base_url: Option<String>,

    /// Optional system prompt sent ahead of the user text
    pub system_prompt: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Transcription endpoint for a self-hosted Whisper-compatible server
    pub stt_base_url: Option<String>,

    /// TTS provider ("piper", "openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// Voice identifier (Piper model path, `OpenAI` voice, `ElevenLabs` voice id)
    pub voice_id: Option<String>,

    /// TTS model for hosted providers
    pub tts_model: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f64>,

    /// Recorder backend ("native" or "command")
    pub recorder: Option<String>,

    /// Player backend ("native" or "command")
    pub player: Option<String>,

    /// Player program for the command backend (e.g. "pw-play")
    pub player_command: Option<String>,

    /// Input device name (cpal name or PipeWire target)
    pub input_device: Option<String>,

    /// Output device name (cpal name, ALSA PCM or PipeWire target)
    pub output_device: Option<String>,

    /// Max time to wait for the user to start and finish speaking
    pub capture_timeout_ms: Option<u64>,

    /// Max length of one utterance once speech started
    pub phrase_limit_ms: Option<u64>,

    /// Ambient noise calibration window (0 disables)
    pub calibrate_ms: Option<u64>,

    /// Minimum RMS energy considered speech
    pub energy_threshold: Option<f32>,

    /// Watchdog for one synthesis + playback call
    pub playback_timeout_ms: Option<u64>,

    /// Directory for transient audio files
    pub artifact_dir: Option<String>,
}

/// Sentence pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Boundary punctuation characters (e.g. ".!?")
    pub boundaries: Option<String>,

    /// Sentences buffered between stream reader and speaker
    pub queue_capacity: Option<usize>,
}

/// Turn loop configuration
#[derive(Debug, Default, Deserialize)]
pub struct TurnFileConfig {
    /// Utterances that end the conversation
    pub exit_phrases: Option<Vec<String>>,

    /// Spoken before terminating
    pub farewell: Option<String>,

    /// Consecutive device failures tolerated before giving up
    pub max_device_failures: Option<u32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file
///
/// With an explicit `path` the file must exist and parse. Without one the
/// standard path is tried and `ParleyConfigFile::default()` is returned if the
/// file doesn't exist or can't be parsed.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<ParleyConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = parse_config(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ParleyConfigFile::default());
    };

    if !path.exists() {
        return Ok(ParleyConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(ParleyConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(ParleyConfigFile::default())
        }
    }
}

/// Parse config file content
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config(content: &str) -> Result<ParleyConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}
