//! Audio playback to speakers

use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};

use super::capture::wav_to_samples;
use super::device::{STOP_POLL, output_device, run_blocking, sleep_unless_stopped};
use crate::error::PlaybackError;
use crate::{Error, Result};

/// Players tried in order when no command is configured
const COMMAND_PLAYERS: &[&str] = &["pw-play", "paplay", "aplay", "afplay"];

/// Plays one audio file to completion
#[async_trait]
pub trait Player: Send + Sync {
    /// Play the file at `path`, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::DeviceUnavailable` if the output fails
    async fn play(&self, path: &Path) -> std::result::Result<(), PlaybackError>;
}

/// Plays audio to an output device via cpal
///
/// The device is opened per call and released when the call returns or is
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct CpalPlayer {
    device: Option<String>,
}

impl CpalPlayer {
    /// Create a player on the default output device
    #[must_use]
    pub const fn new() -> Self {
        Self { device: None }
    }

    /// Play to the output device with this name instead of the default
    #[must_use]
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    /// Play mono samples in a blocking manner
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened or playback fails
    pub fn play_samples_blocking(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        self.play_until_stopped(samples, sample_rate, &AtomicBool::new(false))
    }

    /// Play mono samples until they run out or `stop` is raised
    fn play_until_stopped(&self, samples: &[f32], sample_rate: u32, stop: &AtomicBool) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let device = output_device(self.device.as_deref())?;

        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?
            .into();
        let output_rate = config.sample_rate.0;
        let channels = usize::from(config.channels).max(1);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = output_rate,
            channels,
            "audio playback initialized"
        );

        let samples = Arc::new(resample(samples, sample_rate, output_rate)?);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_cb.load(Ordering::Relaxed);

                    for frame in data.chunks_mut(channels) {
                        let sample = samples_cb.get(pos).copied().unwrap_or_else(|| {
                            finished_cb.store(true, Ordering::Relaxed);
                            0.0
                        });
                        frame.fill(sample);
                        if pos < samples_cb.len() {
                            pos += 1;
                        }
                    }

                    position_cb.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (samples.len() as u64 * 1000) / u64::from(output_rate.max(1));
        let drained = wait_for_playback(&finished, stop, Duration::from_millis(duration_ms + 500));

        if drained {
            // Let the device flush its last buffer
            sleep_unless_stopped(stop, Duration::from_millis(100));
        }

        drop(stream);

        if stop.load(Ordering::Relaxed) {
            tracing::debug!(position = position.load(Ordering::Relaxed), "playback cancelled");
        } else {
            tracing::debug!(samples = samples.len(), "playback complete");
        }

        Ok(())
    }
}

/// Wait until `finished` is set, `stop` is raised or `limit` passes
///
/// Returns `true` only if playback ran to the end.
fn wait_for_playback(finished: &AtomicBool, stop: &AtomicBool, limit: Duration) -> bool {
    let start = Instant::now();
    while !finished.load(Ordering::Relaxed) {
        if start.elapsed() > limit || !sleep_unless_stopped(stop, STOP_POLL) {
            return false;
        }
    }
    true
}

#[async_trait]
impl Player for CpalPlayer {
    async fn play(&self, path: &Path) -> std::result::Result<(), PlaybackError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| PlaybackError::SynthesisFailed(format!("missing audio: {e}")))?;
        let (samples, sample_rate) =
            decode_audio(&data).map_err(|e| PlaybackError::SynthesisFailed(e.to_string()))?;

        let player = self.clone();
        run_blocking(move |stop| player.play_until_stopped(&samples, sample_rate, stop))
            .await
            .map_err(|e| PlaybackError::DeviceUnavailable(format!("playback task failed: {e}")))?
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))
    }
}

/// Plays files through an external program such as `pw-play`
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    device: Option<String>,
}

impl CommandPlayer {
    /// Create a player for `program`
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            device: None,
        }
    }

    /// Pick the first known player found on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if none of the known players is installed
    pub fn detect() -> Result<Self> {
        COMMAND_PLAYERS
            .iter()
            .find(|bin| which::which(bin).is_ok())
            .map(|bin| Self::new(*bin))
            .ok_or_else(|| {
                Error::Config(format!(
                    "no audio player found, install one of: {}",
                    COMMAND_PLAYERS.join(", ")
                ))
            })
    }

    /// Play to this output device (`aplay -D`, `pw-play --target`, ...)
    #[must_use]
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    /// Program in use
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments selecting the output device for the program in use
    fn device_args(&self) -> Vec<String> {
        let Some(device) = &self.device else {
            return Vec::new();
        };
        let name = Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program);

        match name {
            "aplay" => vec!["-D".to_string(), device.clone()],
            "pw-play" | "pw-cat" => vec![format!("--target={device}")],
            "paplay" => vec![format!("--device={device}")],
            _ => {
                tracing::warn!(program = %self.program, device = %device, "player cannot select a device, using default");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Player for CommandPlayer {
    async fn play(&self, path: &Path) -> std::result::Result<(), PlaybackError> {
        let output = tokio::process::Command::new(&self.program)
            .args(self.device_args())
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PlaybackError::DeviceUnavailable(format!("failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::DeviceUnavailable(format!(
                "{} exited with code {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Decode WAV or MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is neither format
pub fn decode_audio(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    if data.starts_with(b"RIFF") {
        wav_to_samples(data)
    } else {
        decode_mp3(data)
    }
}

/// Decode MP3 bytes to f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Resample mono audio using rubato
///
/// # Errors
///
/// Returns error if the resampler rejects the rates
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize + 1);

    for chunk in samples.chunks(chunk_size) {
        let input: [&[f32]; 1] = [chunk];
        let result = if chunk.len() == chunk_size {
            resampler.process(&input[..], None)
        } else {
            resampler.process_partial(Some(&input[..]), None)
        }
        .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output)
}
