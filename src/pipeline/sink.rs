//! Synthesis and playback of one sentence at a time

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::Sentence;
use crate::error::PlaybackError;
use crate::voice::{Player, Synthesizer, TransientArtifact};

/// Default watchdog for one synthesize + play call
pub const DEFAULT_PLAYBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a sentence into sound and waits until it has been heard
///
/// `speak` returns only once playback has finished, so callers that await
/// each call in turn get strictly ordered speech.
#[derive(Clone)]
pub struct SpeechSynthesisSink {
    synthesizer: Arc<dyn Synthesizer>,
    player: Arc<dyn Player>,
    artifact_dir: PathBuf,
    timeout: Duration,
}

impl SpeechSynthesisSink {
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            synthesizer,
            player,
            artifact_dir: artifact_dir.into(),
            timeout: DEFAULT_PLAYBACK_TIMEOUT,
        }
    }

    /// Bound each call; a stuck synthesizer or player fails with `TimedOut`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Speak one sentence
    ///
    /// Blank sentences succeed without touching the synthesizer.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if synthesis or playback failed or the
    /// watchdog expired. The caller decides whether to carry on.
    pub async fn speak(&self, sentence: &Sentence) -> Result<(), PlaybackError> {
        if sentence.is_blank() {
            return Ok(());
        }

        let text = sentence.text().trim();
        tracing::debug!(sentence = %text, "speaking");

        match tokio::time::timeout(self.timeout, self.render(text)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, sentence = %text, "playback watchdog expired");
                Err(PlaybackError::TimedOut(self.timeout))
            }
        }
    }

    /// Convenience for fixed phrases such as the farewell
    ///
    /// # Errors
    ///
    /// Same as [`SpeechSynthesisSink::speak`]
    pub async fn speak_text(&self, text: &str) -> Result<(), PlaybackError> {
        self.speak(&Sentence::new(text)).await
    }

    // The artifact lives in this future, so it is removed on return, on
    // error and when the watchdog drops the future mid-call.
    async fn render(&self, text: &str) -> Result<(), PlaybackError> {
        let artifact =
            TransientArtifact::create(&self.artifact_dir, self.synthesizer.file_extension())
                .map_err(|e| {
                    PlaybackError::SynthesisFailed(format!("cannot create audio file: {e}"))
                })?;

        self.synthesizer.synthesize(text, artifact.path()).await?;
        self.player.play(artifact.path()).await?;

        tracing::trace!(sentence = %text, "playback finished");
        Ok(())
    }
}

impl std::fmt::Debug for SpeechSynthesisSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSynthesisSink")
            .field("artifact_dir", &self.artifact_dir)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
