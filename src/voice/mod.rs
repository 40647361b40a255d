//! Voice processing module
//!
//! Capability traits and backends for the audio side of a turn: recording,
//! transcription, synthesis and playback. Every backend holds its device or
//! child process only for the duration of one call.

mod activity;
mod artifact;
mod capture;
mod device;
mod playback;
mod stt;
mod tts;

pub use activity::{ActivityState, DEFAULT_ENERGY_THRESHOLD, VoiceActivityDetector, calculate_rms};
pub use artifact::TransientArtifact;
pub use capture::{
    CommandRecorder, CpalRecorder, Recorder, SAMPLE_RATE, monitor_input, samples_to_wav,
    wav_to_samples,
};
pub use device::{list_input_devices, list_output_devices};
pub use playback::{CommandPlayer, CpalPlayer, Player, decode_audio, resample};
pub use stt::{SpeechToText, Transcriber, classify_transcript};
pub use tts::{PiperSynthesizer, Synthesizer, TextToSpeech};
