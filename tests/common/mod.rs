//! Shared test utilities: scripted in-memory backends

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use parley::error::{CaptureError, GenerationError, PlaybackError};
use parley::llm::{Generator, TokenStream};
use parley::voice::{Player, Recorder, SAMPLE_RATE, Synthesizer, Transcriber, samples_to_wav};
use parley::{Backends, Config};

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    vec![0.0; (SAMPLE_RATE as f32 * duration_secs) as usize]
}

/// Files currently in `dir`
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}

/// Write an executable recorder stand-in into `dir`
///
/// The script sees the recorder arguments; `$last` holds the destination
/// path when `body` runs.
#[cfg(unix)]
pub fn stub_program(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\nfor last; do :; done\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A WAV file with a header and no samples
pub fn header_only_wav() -> Vec<u8> {
    samples_to_wav(&[], SAMPLE_RATE).unwrap()
}

/// What the next `record` call does
#[derive(Debug, Clone)]
pub enum Take {
    /// Write a second of loud tone
    Speech,
    /// Write a second of silence
    Silence,
    /// Write a partial file, then fail as a device error
    DeviceFailure,
    /// Never finish
    Hang,
}

/// Recorder that plays back a script of takes
#[derive(Default)]
pub struct ScriptedRecorder {
    script: Mutex<VecDeque<Take>>,
    pub paths: Mutex<Vec<PathBuf>>,
}

impl ScriptedRecorder {
    pub fn new(takes: impl IntoIterator<Item = Take>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(takes.into_iter().collect()),
            paths: Mutex::default(),
        })
    }

    pub fn calls(&self) -> usize {
        self.paths.lock().unwrap().len()
    }
}

#[async_trait]
impl Recorder for ScriptedRecorder {
    async fn record(&self, dest: &Path, _limit: Duration) -> Result<(), CaptureError> {
        self.paths.lock().unwrap().push(dest.to_path_buf());
        let take = self.script.lock().unwrap().pop_front().unwrap_or(Take::Silence);

        match take {
            Take::Speech => {
                let wav = samples_to_wav(&generate_sine_samples(440.0, 1.0, 0.5), SAMPLE_RATE).unwrap();
                tokio::fs::write(dest, wav).await.unwrap();
                Ok(())
            }
            Take::Silence => {
                let wav = samples_to_wav(&generate_silence(1.0), SAMPLE_RATE).unwrap();
                tokio::fs::write(dest, wav).await.unwrap();
                Ok(())
            }
            Take::DeviceFailure => {
                tokio::fs::write(dest, b"RIFF").await.unwrap();
                Err(CaptureError::Device("mock device unplugged".to_string()))
            }
            Take::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// Transcriber returning scripted results, then "goodbye"
#[derive(Default)]
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Result<String, CaptureError>>>,
    pub calls: Mutex<usize>,
}

impl ScriptedTranscriber {
    pub fn new(results: impl IntoIterator<Item = Result<String, CaptureError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into_iter().collect()),
            calls: Mutex::default(),
        })
    }

    pub fn saying(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Ok((*t).to_string())))
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _wav: &[u8]) -> Result<String, CaptureError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("goodbye".to_string()))
    }
}

/// One scripted response: either a refused request or a token sequence
pub type Reply = Result<Vec<Result<String, GenerationError>>, GenerationError>;

/// Build a reply out of plain tokens
pub fn tokens(parts: &[&str]) -> Reply {
    Ok(parts.iter().map(|p| Ok((*p).to_string())).collect())
}

/// Generator serving scripted replies in order
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::default(),
        })
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<TokenStream, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| tokens(&["OK."]))?;
        Ok(Box::pin(stream::iter(reply)))
    }
}

/// Synthesizer that writes the text itself as the "audio"
#[derive(Default)]
pub struct TextSynthesizer {
    delays: HashMap<String, Duration>,
    failures: Vec<String>,
    pub texts: Mutex<Vec<String>>,
    pub paths: Mutex<Vec<PathBuf>>,
}

impl TextSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before synthesizing `text`
    pub fn delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Fail when asked to synthesize `text`
    pub fn fail_on(mut self, text: &str) -> Self {
        self.failures.push(text.to_string());
        self
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for TextSynthesizer {
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<(), PlaybackError> {
        self.texts.lock().unwrap().push(text.to_string());
        self.paths.lock().unwrap().push(dest.to_path_buf());

        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.iter().any(|f| f == text) {
            tokio::fs::write(dest, b"partial").await.unwrap();
            return Err(PlaybackError::SynthesisFailed("mock voice refused".to_string()));
        }

        tokio::fs::write(dest, text).await.unwrap();
        Ok(())
    }
}

/// Player that "plays" by reading the file into a log
#[derive(Default)]
pub struct RecordingPlayer {
    fail: bool,
    pub played: Mutex<Vec<String>>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl Player for RecordingPlayer {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        if self.fail {
            return Err(PlaybackError::DeviceUnavailable("mock speaker missing".to_string()));
        }
        let audio = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
        self.played.lock().unwrap().push(audio);
        Ok(())
    }
}

/// Config pointing all transient files at `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.voice.artifact_dir = dir.to_path_buf();
    config.voice.capture_timeout = Duration::from_millis(200);
    config.voice.phrase_limit = Duration::from_millis(200);
    config.voice.calibrate = Duration::ZERO;
    config.voice.playback_timeout = Duration::from_secs(5);
    config
}

/// Handles kept by a test to inspect what the backends saw
pub struct Mocks {
    pub recorder: Arc<ScriptedRecorder>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub generator: Arc<ScriptedGenerator>,
    pub synthesizer: Arc<TextSynthesizer>,
    pub player: Arc<RecordingPlayer>,
}

impl Mocks {
    pub fn backends(&self) -> Backends {
        Backends {
            recorder: self.recorder.clone(),
            transcriber: self.transcriber.clone(),
            generator: self.generator.clone(),
            synthesizer: self.synthesizer.clone(),
            player: self.player.clone(),
        }
    }
}
