//! The conversation turn loop

mod capture;
mod controller;

use std::fmt;

pub use capture::CaptureSession;
pub use controller::TurnController;

use crate::error::{CaptureError, GenerationError};
use crate::pipeline::ResponseSummary;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    Transcribing,
    Responding,
    Speaking,
    Terminated,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::Responding => "responding",
            Self::Speaking => "speaking",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How one turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A response was generated and spoken
    Responded(ResponseSummary),

    /// Capture failed in a recoverable way; listen again
    Retry(CaptureError),

    /// Generation failed; the turn was abandoned
    Failed(GenerationError),

    /// An exit phrase was heard and the farewell spoken
    Terminated,
}

impl TurnOutcome {
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}
