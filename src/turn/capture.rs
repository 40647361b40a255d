//! One listen → transcribe operation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CaptureError;
use crate::voice::{
    DEFAULT_ENERGY_THRESHOLD, Recorder, Transcriber, TransientArtifact, VoiceActivityDetector,
    wav_to_samples,
};

/// Extra time a recorder gets beyond the listen limit before it is abandoned
const DEFAULT_GRACE: Duration = Duration::from_secs(12);

/// Records one utterance and turns it into text
pub struct CaptureSession {
    recorder: Arc<dyn Recorder>,
    transcriber: Arc<dyn Transcriber>,
    artifact_dir: PathBuf,
    timeout: Duration,
    grace: Duration,
    detector: VoiceActivityDetector,
}

impl CaptureSession {
    /// `timeout` is how long to wait for the user to start talking
    #[must_use]
    pub fn new(
        recorder: Arc<dyn Recorder>,
        transcriber: Arc<dyn Transcriber>,
        artifact_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            recorder,
            transcriber,
            artifact_dir: artifact_dir.into(),
            timeout,
            grace: DEFAULT_GRACE,
            detector: VoiceActivityDetector::new(DEFAULT_ENERGY_THRESHOLD),
        }
    }

    /// Minimum RMS energy that counts as speech in the recording
    #[must_use]
    pub const fn with_energy_threshold(mut self, threshold: f32) -> Self {
        self.detector = VoiceActivityDetector::new(threshold);
        self
    }

    /// Time allowed past `timeout` for the utterance itself and for the
    /// recorder to finalize its file
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Upper bound on one `capture()` call before transcription
    #[must_use]
    pub fn hard_limit(&self) -> Duration {
        self.timeout + self.grace
    }

    /// Listen once and return the recognized text
    ///
    /// The capture file and the input device are released before this
    /// returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - `NoSpeechDetected` if the recording holds only sound below the threshold
    /// - `UnintelligibleAudio` if the transcriber produced no usable text
    /// - `Device` if recording failed, produced no samples or overran the
    ///   hard limit
    /// - `Transcription` if the transcription service failed
    pub async fn capture(&self) -> Result<String, CaptureError> {
        let artifact = TransientArtifact::create(&self.artifact_dir, "wav")
            .map_err(|e| CaptureError::Device(format!("cannot create capture file: {e}")))?;

        tracing::debug!(timeout = ?self.timeout, path = %artifact.path().display(), "listening");

        tokio::time::timeout(self.hard_limit(), self.recorder.record(artifact.path(), self.timeout))
            .await
            .map_err(|_| {
                CaptureError::Device(format!("recording did not finish within {:?}", self.hard_limit()))
            })??;

        let wav = artifact
            .read()
            .await
            .map_err(|e| CaptureError::Device(format!("cannot read recording: {e}")))?;
        drop(artifact);

        let (samples, sample_rate) = wav_to_samples(&wav)
            .map_err(|e| CaptureError::Device(format!("unreadable recording: {e}")))?;

        // Silence still has samples; a header alone means the device gave nothing
        if samples.is_empty() {
            return Err(CaptureError::Device("recording contains no audio".to_string()));
        }

        if !self.detector.contains_speech(&samples) {
            tracing::debug!(samples = samples.len(), sample_rate, "recording is silent");
            return Err(CaptureError::NoSpeechDetected);
        }

        tracing::debug!(bytes = wav.len(), "transcribing");
        let text = self.transcriber.transcribe(&wav).await?;
        tracing::info!(text = %text, "transcribed");
        Ok(text)
    }
}
