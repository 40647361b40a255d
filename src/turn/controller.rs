//! Turn state machine
//!
//! ```text
//! Idle ─► Listening ─► Transcribing ─► Responding ─► Speaking ─► Idle
//!            │              │              │             │
//!            │ recoverable  │ exit phrase  └──── generation error ──► Idle
//!            ▼              ▼
//!          Idle         Terminated
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::{CaptureSession, TurnOutcome, TurnState};
use crate::backends::Backends;
use crate::config::Config;
use crate::error::{CaptureError, GenerationError};
use crate::llm::Generator;
use crate::pipeline::{ResponseStreamConsumer, SentenceSegmenter, SpeechSynthesisSink, Transcript};
use crate::{Error, Result};

/// Spoken when the transcriber could not make sense of the audio
const APOLOGY: &str = "Sorry, I didn't catch that.";

/// Time a recorder gets to finalize its file after the utterance
const RECORDER_GRACE: Duration = Duration::from_secs(2);

/// Runs conversation turns until an exit phrase or shutdown
pub struct TurnController {
    capture: CaptureSession,
    generator: Arc<dyn Generator>,
    consumer: ResponseStreamConsumer,
    transcript: Transcript,
    exit_phrases: Vec<String>,
    farewell: String,
    max_device_failures: u32,
    device_failures: u32,
    state: watch::Sender<TurnState>,
}

impl TurnController {
    /// Wire a controller from configuration and a set of backends
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the sentence boundary set is invalid
    pub fn new(config: &Config, backends: Backends) -> Result<Self> {
        let voice = &config.voice;

        let capture = CaptureSession::new(
            backends.recorder,
            backends.transcriber,
            &voice.artifact_dir,
            voice.capture_timeout,
        )
        .with_energy_threshold(voice.energy_threshold)
        .with_grace(voice.calibrate + voice.phrase_limit + RECORDER_GRACE);

        let sink = SpeechSynthesisSink::new(backends.synthesizer, backends.player, &voice.artifact_dir)
            .with_timeout(voice.playback_timeout);
        let segmenter = SentenceSegmenter::new(config.pipeline.boundaries.iter().copied())?;
        let consumer = ResponseStreamConsumer::new(sink, segmenter, config.pipeline.queue_capacity);

        let (state, _) = watch::channel(TurnState::Idle);

        Ok(Self {
            capture,
            generator: backends.generator,
            consumer,
            transcript: Transcript::stdout(),
            exit_phrases: config
                .turn
                .exit_phrases
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .collect(),
            farewell: config.turn.farewell.clone(),
            max_device_failures: config.turn.max_device_failures.max(1),
            device_failures: 0,
            state,
        })
    }

    /// Send the user-facing transcript somewhere other than stdout
    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.consumer = self.consumer.with_transcript(transcript.clone());
        self.transcript = transcript;
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TurnState> {
        self.state.subscribe()
    }

    /// Whether `text` is one of the configured exit phrases
    ///
    /// Case and surrounding whitespace are ignored, as is trailing
    /// punctuation the transcriber tends to add ("Goodbye." matches
    /// "goodbye").
    #[must_use]
    pub fn is_exit_phrase(&self, text: &str) -> bool {
        let text = normalize(text);
        self.exit_phrases.iter().any(|p| *p == text)
    }

    /// Loop until an exit phrase is heard
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` once the input device has failed
    /// `max_device_failures` times in a row
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Loop until an exit phrase is heard or `shutdown` completes
    ///
    /// A turn in flight when `shutdown` fires is dropped; its audio files
    /// are removed and its child processes killed as the future unwinds.
    ///
    /// # Errors
    ///
    /// Same as [`TurnController::run`]
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("conversation started");

        loop {
            let turn = tokio::select! {
                biased;
                () = &mut shutdown => None,
                outcome = self.run_turn() => Some(outcome),
            };

            match turn {
                None => {
                    tracing::info!("shutdown requested");
                    self.set_state(TurnState::Terminated);
                    return Ok(());
                }
                Some(outcome) => {
                    if outcome?.is_terminated() {
                        tracing::info!("conversation ended");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run exactly one turn
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` when consecutive device failures reach the
    /// configured bound; every other failure is reported in the outcome
    pub async fn run_turn(&mut self) -> Result<TurnOutcome> {
        if self.state() == TurnState::Terminated {
            return Ok(TurnOutcome::Terminated);
        }

        self.set_state(TurnState::Listening);
        let text = match self.capture.capture().await {
            Ok(text) => {
                self.device_failures = 0;
                text
            }
            Err(e) => return self.recover(e).await,
        };

        self.set_state(TurnState::Transcribing);
        self.transcript.user(&text);

        if self.is_exit_phrase(&text) {
            tracing::info!(text = %text, "exit phrase heard");
            self.transcript.assistant(&self.farewell);
            if let Err(e) = self.consumer.sink().speak_text(&self.farewell).await {
                tracing::warn!(error = %e, "failed to speak farewell");
            }
            self.set_state(TurnState::Terminated);
            return Ok(TurnOutcome::Terminated);
        }

        self.set_state(TurnState::Responding);
        let stream = match self.generator.generate(&text).await {
            Ok(stream) => stream,
            Err(e) => return Ok(self.abandon(e)),
        };

        self.set_state(TurnState::Speaking);
        let outcome = match self.consumer.consume(stream).await {
            Ok(summary) => TurnOutcome::Responded(summary),
            Err(e) => return Ok(self.abandon(e)),
        };

        self.set_state(TurnState::Idle);
        Ok(outcome)
    }

    async fn recover(&mut self, error: CaptureError) -> Result<TurnOutcome> {
        self.set_state(TurnState::Idle);

        if !error.is_device() {
            self.device_failures = 0;
        }

        match &error {
            CaptureError::NoSpeechDetected => {
                tracing::debug!("no speech, listening again");
            }
            CaptureError::UnintelligibleAudio => {
                self.transcript.system("Could not understand audio");
                self.transcript.assistant(APOLOGY);
                if let Err(e) = self.consumer.sink().speak_text(APOLOGY).await {
                    tracing::warn!(error = %e, "failed to speak apology");
                }
            }
            CaptureError::Transcription(msg) => {
                tracing::warn!(error = %msg, "transcription failed");
                self.transcript.system(&format!("Transcription failed: {msg}"));
            }
            CaptureError::Device(msg) => {
                self.device_failures += 1;
                tracing::warn!(
                    error = %msg,
                    failures = self.device_failures,
                    max = self.max_device_failures,
                    "input device failed"
                );
                self.transcript.system(&format!("Microphone error: {msg}"));

                if self.device_failures >= self.max_device_failures {
                    tracing::error!(failures = self.device_failures, "giving up on input device");
                    return Err(Error::Capture(error.clone()));
                }
            }
        }

        Ok(TurnOutcome::Retry(error))
    }

    fn abandon(&self, error: GenerationError) -> TurnOutcome {
        tracing::error!(error = %error, "response failed");
        self.transcript.system(&format!("Response failed: {error}"));
        self.set_state(TurnState::Idle);
        TurnOutcome::Failed(error)
    }

    fn set_state(&self, next: TurnState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "turn state");
        }
    }
}

impl std::fmt::Debug for TurnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnController")
            .field("state", &self.state())
            .field("exit_phrases", &self.exit_phrases)
            .field("device_failures", &self.device_failures)
            .finish_non_exhaustive()
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Goodbye. "), "goodbye");
        assert_eq!(normalize("QUIT!!"), "quit");
        assert_eq!(normalize("exit now"), "exit now");
        assert_eq!(normalize("?!"), "");
    }
}
