//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Parley
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or codec error outside of a capture/playback call
    #[error("audio error: {0}")]
    Audio(String),

    /// Capture failed (listen or transcribe)
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Response generation failed
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Synthesis or playback failed
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure of one listen → transcribe operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Nothing above the energy threshold before the capture limit
    #[error("no speech detected")]
    NoSpeechDetected,

    /// Audio was captured but could not be turned into text
    #[error("could not understand audio")]
    UnintelligibleAudio,

    /// Input device unavailable or failed mid-recording
    #[error("input device error: {0}")]
    Device(String),

    /// Transcription service failed
    #[error("transcription failed: {0}")]
    Transcription(String),
}

impl CaptureError {
    /// Whether the error says something about the input device itself
    #[must_use]
    pub const fn is_device(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

/// Failure while opening or reading a response stream
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The generation service could not be reached or refused the request
    #[error("generation service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The stream broke after it was opened
    #[error("response stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Failure while speaking one sentence
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// Text could not be synthesized
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Output device missing or playback failed
    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Synthesis plus playback exceeded the watchdog
    #[error("playback timed out after {0:?}")]
    TimedOut(std::time::Duration),
}
