//! Parley - a spoken conversation loop
//!
//! Listen, transcribe, stream a model response and speak it back sentence
//! by sentence while the rest of the response is still arriving.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  TurnController                      │
//! │   Idle → Listening → Transcribing → Responding →    │
//! │   Speaking → Idle (or Terminated)                    │
//! └───────┬───────────────────────────────┬─────────────┘
//!         │                               │
//! ┌───────▼────────┐        ┌─────────────▼─────────────┐
//! │ CaptureSession │        │  ResponseStreamConsumer   │
//! │ record → VAD → │        │  tokens → segmenter →     │
//! │ transcribe     │        │  [queue] → speech sink    │
//! └───────┬────────┘        └─────────────┬─────────────┘
//!         │                               │
//! ┌───────▼───────────────────────────────▼─────────────┐
//! │  Backends: Recorder │ Transcriber │ Generator │      │
//! │            Synthesizer │ Player                      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod turn;
pub mod voice;

pub use backends::Backends;
pub use config::Config;
pub use error::{CaptureError, Error, GenerationError, PlaybackError, Result};
pub use llm::{Generator, TokenStream};
pub use pipeline::{
    ResponseStreamConsumer, ResponseSummary, Sentence, SentenceSegmenter, SpeechSynthesisSink,
    Transcript,
};
pub use turn::{CaptureSession, TurnController, TurnOutcome, TurnState};
