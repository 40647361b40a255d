//! Audio capture from microphone

use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::activity::{ActivityState, VoiceActivityDetector};
use super::device::{STOP_POLL, input_device, run_blocking, sleep_unless_stopped};
use crate::error::CaptureError;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Grace period for a command recorder to finalize its file
const COMMAND_GRACE: Duration = Duration::from_secs(2);

/// Records one utterance into a WAV file
///
/// Implementations acquire the input device at the start of `record` and
/// release it before returning, on every path.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Record at most roughly `limit` of waiting for speech into `dest`
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Device` if the input device is unavailable
    async fn record(&self, dest: &Path, limit: Duration) -> std::result::Result<(), CaptureError>;
}

/// Captures audio from an input device via cpal
#[derive(Debug, Clone)]
pub struct CpalRecorder {
    energy_threshold: f32,
    calibrate: Duration,
    phrase_limit: Duration,
    device: Option<String>,
}

impl CpalRecorder {
    /// Create a recorder on the default input device
    ///
    /// `calibrate` of zero skips ambient noise calibration. `phrase_limit`
    /// bounds the utterance once speech started.
    #[must_use]
    pub const fn new(energy_threshold: f32, calibrate: Duration, phrase_limit: Duration) -> Self {
        Self {
            energy_threshold,
            calibrate,
            phrase_limit,
            device: None,
        }
    }

    /// Record from the input device with this name instead of the default
    #[must_use]
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    /// Blocking capture: open device, record until the utterance completes,
    /// a limit is hit or `stop` is raised, release device
    fn record_blocking(&self, limit: Duration, stop: &AtomicBool) -> Result<Vec<f32>> {
        let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
        let stream = open_input(self.device.as_deref(), Arc::clone(&buffer))?;
        tracing::debug!("audio capture started");

        let recorded = self.listen(limit, stop, || {
            buffer
                .lock()
                .map(|mut buf| std::mem::take(&mut *buf))
                .unwrap_or_default()
        });

        drop(stream);
        tracing::debug!(samples = recorded.len(), "audio capture stopped");

        if stop.load(Ordering::Relaxed) {
            return Err(Error::Audio("capture cancelled".to_string()));
        }
        Ok(recorded)
    }

    /// Poll `take` for device samples until the detector sees a complete
    /// utterance, a limit is reached or `stop` is raised
    fn listen<F>(&self, limit: Duration, stop: &AtomicBool, mut take: F) -> Vec<f32>
    where
        F: FnMut() -> Vec<f32>,
    {
        let mut detector = VoiceActivityDetector::new(self.energy_threshold);
        if !self.calibrate.is_zero() {
            if !sleep_unless_stopped(stop, self.calibrate) {
                return Vec::new();
            }
            detector.calibrate(&take());
        }

        let started = Instant::now();
        let mut speech_started: Option<Instant> = None;
        let mut recorded = Vec::new();

        while sleep_unless_stopped(stop, STOP_POLL) {
            let samples = take();
            let state = detector.process(&samples);
            recorded.extend_from_slice(&samples);

            if state == ActivityState::Complete {
                break;
            }
            if state == ActivityState::Speaking {
                let since = *speech_started.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.phrase_limit {
                    tracing::debug!("phrase limit reached");
                    break;
                }
            } else if started.elapsed() >= limit {
                tracing::debug!(?limit, "capture timeout, no speech");
                break;
            }
        }

        tracing::trace!(heard_speech = detector.heard_speech(), "listen loop finished");
        recorded
    }
}

#[async_trait]
impl Recorder for CpalRecorder {
    async fn record(&self, dest: &Path, limit: Duration) -> std::result::Result<(), CaptureError> {
        let recorder = self.clone();
        let samples = run_blocking(move |stop| recorder.record_blocking(limit, stop))
            .await
            .map_err(|e| CaptureError::Device(format!("capture task failed: {e}")))?
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        let wav = samples_to_wav(&samples, SAMPLE_RATE)
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        tokio::fs::write(dest, wav)
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))
    }
}

/// Open an input device at 16 kHz and stream mono samples into `buffer`.
/// The device is released when the returned stream is dropped.
#[allow(clippy::cast_precision_loss)]
fn open_input(name: Option<&str>, buffer: Arc<Mutex<Vec<f32>>>) -> Result<cpal::Stream> {
    let device = input_device(name)?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| {
            c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config: StreamConfig = supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config();
    let channels = usize::from(config.channels).max(1);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    // Downmix to mono
                    buf.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                    );
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

/// Hand the samples captured during each second to `report`, for `seconds`
/// seconds. Used by the microphone check.
///
/// # Errors
///
/// Returns error if the input device cannot be opened
pub fn monitor_input<F>(device: Option<&str>, seconds: u64, mut report: F) -> Result<()>
where
    F: FnMut(u64, &[f32]),
{
    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let stream = open_input(device, Arc::clone(&buffer))?;

    for second in 1..=seconds {
        std::thread::sleep(Duration::from_secs(1));
        let samples = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        report(second, &samples);
    }

    drop(stream);
    Ok(())
}

/// Records through an external program such as `pw-record`
///
/// The program is run under `timeout -s INT` so it can finalize the WAV
/// header when the limit expires.
#[derive(Debug, Clone)]
pub struct CommandRecorder {
    program: String,
    device: Option<String>,
}

impl CommandRecorder {
    /// Create a recorder for `program` (e.g. "pw-record")
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            device: None,
        }
    }

    /// Record from this PipeWire target instead of the default source
    #[must_use]
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }
}

impl Default for CommandRecorder {
    fn default() -> Self {
        Self::new("pw-record")
    }
}

/// Exit code of `timeout` when it had to stop the program
const TIMEOUT_EXPIRED: i32 = 124;

#[async_trait]
impl Recorder for CommandRecorder {
    async fn record(&self, dest: &Path, limit: Duration) -> std::result::Result<(), CaptureError> {
        which::which(&self.program)
            .map_err(|_| CaptureError::Device(format!("{} not found on PATH", self.program)))?;

        let duration = format!("{:.3}s", limit.as_secs_f64());
        let mut command = tokio::process::Command::new("timeout");
        command
            .args(["-s", "INT", duration.as_str()])
            .arg(&self.program)
            .args([
                "--format=s16".to_string(),
                format!("--rate={SAMPLE_RATE}"),
                "--channels=1".to_string(),
            ]);
        if let Some(device) = &self.device {
            command.arg(format!("--target={device}"));
        }
        command
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let status = tokio::time::timeout(limit + COMMAND_GRACE, command.status())
            .await
            .map_err(|_| CaptureError::Device(format!("{} did not stop", self.program)))?
            .map_err(|e| CaptureError::Device(format!("failed to run {}: {e}", self.program)))?;

        tracing::debug!(program = %self.program, code = ?status.code(), "recorder exited");

        if !status.success() && status.code() != Some(TIMEOUT_EXPIRED) {
            return Err(CaptureError::Device(format!(
                "{} exited with code {}",
                self.program,
                status.code().unwrap_or(-1)
            )));
        }

        let written = tokio::fs::metadata(dest).await.map_or(0, |m| m.len());
        if written == 0 {
            return Err(CaptureError::Device("no audio file created".to_string()));
        }
        Ok(())
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Decode WAV bytes into mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data is not a readable PCM WAV
pub fn wav_to_samples(wav: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels).max(1);

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    #[allow(clippy::cast_precision_loss)]
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}
