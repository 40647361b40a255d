//! Energy-based voice activity detection
//!
//! Decides whether captured audio contains speech and when an utterance has
//! ended. Used live by the native recorder to stop early, and after the fact
//! by the capture session to classify silent recordings.

use super::SAMPLE_RATE;

/// Default RMS energy threshold to consider speech
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to count as an utterance (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 12800; // 0.8 seconds

/// Ambient level is scaled by this before it can raise the threshold
const AMBIENT_MULTIPLIER: f32 = 1.5;

/// Analysis frame for offline detection (30ms)
const FRAME_SAMPLES: usize = SAMPLE_RATE as usize * 30 / 1000;

/// State of the activity detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// Waiting for speech
    Waiting,
    /// Speech in progress
    Speaking,
    /// Enough speech followed by enough silence
    Complete,
}

/// Detects speech activity in audio
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    base_threshold: f32,
    threshold: f32,
    state: ActivityState,
    speech_samples: usize,
    silence_counter: usize,
}

impl VoiceActivityDetector {
    /// Create a detector with a fixed minimum energy threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            base_threshold: threshold,
            threshold,
            state: ActivityState::Waiting,
            speech_samples: 0,
            silence_counter: 0,
        }
    }

    /// Raise the threshold above the ambient noise level
    ///
    /// Never lowers it below the configured minimum. Returns the threshold in
    /// effect afterwards.
    pub fn calibrate(&mut self, ambient: &[f32]) -> f32 {
        let ambient_rms = calculate_rms(ambient);
        self.threshold = self.base_threshold.max(ambient_rms * AMBIENT_MULTIPLIER);
        tracing::debug!(
            ambient_rms,
            threshold = self.threshold,
            "calibrated for ambient noise"
        );
        self.threshold
    }

    /// Feed live samples and return the resulting state
    pub fn process(&mut self, samples: &[f32]) -> ActivityState {
        if samples.is_empty() {
            return self.state;
        }

        let energy = calculate_rms(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            ActivityState::Waiting => {
                if is_speech {
                    self.state = ActivityState::Speaking;
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            ActivityState::Speaking => {
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_samples >= MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(
                        speech_samples = self.speech_samples,
                        "utterance complete"
                    );
                    self.state = ActivityState::Complete;
                } else if self.silence_counter > SILENCE_SAMPLES * 2 {
                    // A short blip followed by a long pause is noise
                    tracing::trace!("speech too short, resetting");
                    self.state = ActivityState::Waiting;
                    self.speech_samples = 0;
                    self.silence_counter = 0;
                }
            }
            ActivityState::Complete => {}
        }

        self.state
    }

    /// Whether a whole recording contains at least one utterance's worth of
    /// frames above the threshold
    #[must_use]
    pub fn contains_speech(&self, samples: &[f32]) -> bool {
        let loud: usize = samples
            .chunks(FRAME_SAMPLES)
            .filter(|frame| calculate_rms(frame) > self.threshold)
            .map(<[f32]>::len)
            .sum();
        loud >= MIN_SPEECH_SAMPLES
    }

    /// Whether any speech has been seen so far
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        !matches!(self.state, ActivityState::Waiting)
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
