//! Backend selection from configuration

use std::sync::Arc;

use crate::config::{AudioBackend, Config, LlmProvider, SttProvider, TtsProvider};
use crate::llm::{Generator, OllamaGenerator, OpenAiGenerator};
use crate::voice::{
    CommandPlayer, CommandRecorder, CpalPlayer, CpalRecorder, PiperSynthesizer, Player, Recorder,
    SpeechToText, Synthesizer, TextToSpeech, Transcriber,
};
use crate::{Error, Result};

/// The five external capabilities one conversation needs
#[derive(Clone)]
pub struct Backends {
    pub recorder: Arc<dyn Recorder>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub player: Arc<dyn Player>,
}

impl Backends {
    /// Build every backend the configuration names
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a required key, binary or model file is
    /// missing
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            recorder: recorder(config),
            transcriber: transcriber(config)?,
            generator: generator(config),
            synthesizer: synthesizer(config)?,
            player: player(config)?,
        })
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Recorder for `voice.recorder`
#[must_use]
pub fn recorder(config: &Config) -> Arc<dyn Recorder> {
    let voice = &config.voice;
    match voice.recorder {
        AudioBackend::Native => Arc::new(
            CpalRecorder::new(voice.energy_threshold, voice.calibrate, voice.phrase_limit)
                .with_device(voice.input_device.clone()),
        ),
        AudioBackend::Command => {
            Arc::new(CommandRecorder::default().with_device(voice.input_device.clone()))
        }
    }
}

/// Transcriber for `voice.stt_provider`
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let voice = &config.voice;
    let stt = match voice.stt_provider {
        SttProvider::Whisper => SpeechToText::new_whisper(
            config.api_keys.openai.clone().unwrap_or_default(),
            voice.stt_model.clone(),
        )?,
        SttProvider::Deepgram => SpeechToText::new_deepgram(
            config.api_keys.deepgram.clone().unwrap_or_default(),
            voice.stt_model.clone(),
        )?,
    };
    Ok(Arc::new(match &voice.stt_base_url {
        Some(url) => stt.with_base_url(url),
        None => stt,
    }))
}

/// Generator for `llm.provider`
#[must_use]
pub fn generator(config: &Config) -> Arc<dyn Generator> {
    let llm = &config.llm;
    match llm.provider {
        LlmProvider::Ollama => Arc::new(
            OllamaGenerator::new(&llm.base_url, &llm.model_id)
                .with_system_prompt(llm.system_prompt.clone()),
        ),
        LlmProvider::OpenAi => Arc::new(
            OpenAiGenerator::new(&llm.base_url, &llm.model_id)
                .with_api_key(config.api_keys.openai.clone())
                .with_system_prompt(llm.system_prompt.clone()),
        ),
    }
}

/// Synthesizer for `voice.tts_provider`
///
/// # Errors
///
/// Returns error if the Piper model file or an API key is missing
pub fn synthesizer(config: &Config) -> Result<Arc<dyn Synthesizer>> {
    let voice = &config.voice;
    Ok(match voice.tts_provider {
        TtsProvider::Piper => Arc::new(PiperSynthesizer::new(&voice.voice_id)?),
        TtsProvider::OpenAi => Arc::new(TextToSpeech::new_openai(
            config.api_keys.openai.clone().unwrap_or_default(),
            voice.voice_id.clone(),
            voice.tts_speed,
            voice.tts_model.clone(),
        )?),
        TtsProvider::ElevenLabs => Arc::new(TextToSpeech::new_elevenlabs(
            config.api_keys.elevenlabs.clone().unwrap_or_default(),
            voice.voice_id.clone(),
            voice.tts_model.clone(),
        )?),
    })
}

/// Player for `voice.player`
///
/// # Errors
///
/// Returns error if the command backend is chosen and no player program is
/// installed
pub fn player(config: &Config) -> Result<Arc<dyn Player>> {
    let voice = &config.voice;
    match (voice.player, &voice.player_command) {
        (AudioBackend::Native, _) => Ok(Arc::new(
            CpalPlayer::new().with_device(voice.output_device.clone()),
        )),
        (AudioBackend::Command, Some(program)) => {
            which::which(program)
                .map_err(|_| Error::Config(format!("player {program} not found on PATH")))?;
            Ok(Arc::new(
                CommandPlayer::new(program).with_device(voice.output_device.clone()),
            ))
        }
        (AudioBackend::Command, None) => {
            let player = CommandPlayer::detect()?.with_device(voice.output_device.clone());
            tracing::debug!(program = player.program(), "using command player");
            Ok(Arc::new(player))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;

    #[test]
    fn test_missing_keys_rejected() {
        let config = Config::default();
        assert!(matches!(transcriber(&config), Err(Error::Config(_))));

        let mut config = Config::default();
        config.voice.stt_provider = SttProvider::Deepgram;
        config.api_keys.deepgram = Some("dg".to_string());
        assert!(transcriber(&config).is_ok());
    }

    #[tokio::test]
    async fn test_transcriber_uses_configured_endpoint() {
        let mut config = Config::default();
        config.api_keys.openai = Some("sk-test".to_string());
        config.voice.stt_base_url = Some("http://127.0.0.1:1/".to_string());

        let stt = transcriber(&config).unwrap();
        let wav = crate::voice::samples_to_wav(&[0.0; 160], crate::voice::SAMPLE_RATE).unwrap();

        match stt.transcribe(&wav).await {
            Err(CaptureError::Transcription(msg)) => assert!(msg.contains("127.0.0.1:1"), "{msg}"),
            other => panic!("expected a transcription failure, got {other:?}"),
        }
    }

    #[test]
    fn test_piper_needs_model_file() {
        let mut config = Config::default();
        config.voice.voice_id = "/nonexistent/voice.onnx".to_string();
        assert!(matches!(synthesizer(&config), Err(Error::Config(_))));

        config.voice.tts_provider = TtsProvider::OpenAi;
        config.voice.voice_id = "alloy".to_string();
        config.api_keys.openai = Some("sk-test".to_string());
        assert!(synthesizer(&config).is_ok());
    }

    #[test]
    fn test_generator_and_native_audio_build_without_io() {
        let mut config = Config::default();
        let _ = generator(&config);
        config.llm.provider = LlmProvider::OpenAi;
        let _ = generator(&config);
        let _ = recorder(&config);
        assert!(player(&config).is_ok());
    }
}
