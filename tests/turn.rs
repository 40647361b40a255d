//! Turn loop integration tests
//!
//! Full turns against scripted backends: capture, exit phrases, retries,
//! device failure escalation and generation failures.

use std::sync::Arc;
use std::time::Duration;

use parley::error::{CaptureError, GenerationError};
use parley::voice::{CommandRecorder, Recorder, SAMPLE_RATE, samples_to_wav};
use parley::{CaptureSession, Error, Transcript, TurnController, TurnOutcome, TurnState};

mod common;

use common::{
    Mocks, RecordingPlayer, ScriptedGenerator, ScriptedRecorder, ScriptedTranscriber, Take,
    TextSynthesizer, files_in, generate_sine_samples, header_only_wav, test_config, tokens,
};

fn mocks(takes: Vec<Take>, said: Vec<Result<String, CaptureError>>, replies: Vec<common::Reply>) -> Mocks {
    Mocks {
        recorder: ScriptedRecorder::new(takes),
        transcriber: ScriptedTranscriber::new(said),
        generator: ScriptedGenerator::new(replies),
        synthesizer: Arc::new(TextSynthesizer::new()),
        player: Arc::new(RecordingPlayer::new()),
    }
}

fn controller(dir: &std::path::Path, mocks: &Mocks) -> TurnController {
    TurnController::new(&test_config(dir), mocks.backends())
        .unwrap()
        .with_transcript(Transcript::silent())
}

fn session(dir: &std::path::Path, mocks: &Mocks) -> CaptureSession {
    CaptureSession::new(
        mocks.recorder.clone(),
        mocks.transcriber.clone(),
        dir,
        Duration::from_millis(200),
    )
    .with_grace(Duration::from_millis(300))
}

#[tokio::test]
async fn test_capture_returns_text_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::Speech], vec![Ok("what time is it".into())], vec![]);

    let text = session(dir.path(), &mocks).capture().await.unwrap();

    assert_eq!(text, "what time is it");
    let used = mocks.recorder.paths.lock().unwrap()[0].clone();
    assert!(used.starts_with(dir.path()));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_silent_capture_is_no_speech() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::Silence], vec![], vec![]);

    let result = session(dir.path(), &mocks).capture().await;

    assert_eq!(result, Err(CaptureError::NoSpeechDetected));
    // Silent audio never reaches the transcriber
    assert_eq!(*mocks.transcriber.calls.lock().unwrap(), 0);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_device_failure_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::DeviceFailure], vec![], vec![]);

    let result = session(dir.path(), &mocks).capture().await;

    assert!(matches!(result, Err(CaptureError::Device(_))));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_hung_recorder_hits_hard_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::Hang], vec![], vec![]);

    let session = session(dir.path(), &mocks);
    assert_eq!(session.hard_limit(), Duration::from_millis(500));

    let result = session.capture().await;

    assert!(matches!(result, Err(CaptureError::Device(msg)) if msg.contains("did not finish")));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_unintelligible_audio_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::Speech], vec![Err(CaptureError::UnintelligibleAudio)], vec![]);

    let result = session(dir.path(), &mocks).capture().await;

    assert_eq!(result, Err(CaptureError::UnintelligibleAudio));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_turn_responds_and_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(
        vec![Take::Speech],
        vec![Ok("tell me a joke".into())],
        vec![tokens(&["Why did", " the crab", " never share? ", "Because", " he's shellfish."])],
    );
    let mut controller = controller(dir.path(), &mocks);

    let outcome = controller.run_turn().await.unwrap();

    let TurnOutcome::Responded(summary) = outcome else {
        panic!("expected a response, got {outcome:?}");
    };
    assert_eq!(summary.sentences, 2);
    assert_eq!(
        mocks.player.played(),
        vec!["Why did the crab never share?", "Because he's shellfish."]
    );
    assert_eq!(*mocks.generator.prompts.lock().unwrap(), vec!["tell me a joke"]);
    assert_eq!(controller.state(), TurnState::Idle);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_exit_phrase_terminates_after_farewell() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::Speech, Take::Speech], vec![Ok("Goodbye.".into())], vec![]);
    let mut controller = controller(dir.path(), &mocks);

    controller.run().await.unwrap();

    assert_eq!(controller.state(), TurnState::Terminated);
    assert_eq!(mocks.player.played(), vec!["Goodbye!"]);
    assert!(mocks.generator.prompts.lock().unwrap().is_empty());

    // No further capture, even if asked to run another turn
    assert_eq!(controller.run_turn().await.unwrap(), TurnOutcome::Terminated);
    assert_eq!(mocks.recorder.calls(), 1);
}

#[tokio::test]
async fn test_exit_phrase_matching() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![], vec![], vec![]);
    let controller = controller(dir.path(), &mocks);

    assert!(controller.is_exit_phrase("exit"));
    assert!(controller.is_exit_phrase("  QUIT! "));
    assert!(controller.is_exit_phrase("Goodbye."));
    assert!(!controller.is_exit_phrase("goodbye for now"));
    assert!(!controller.is_exit_phrase("please exit the building"));
}

#[tokio::test]
async fn test_recoverable_capture_errors_retry() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(
        vec![Take::Silence, Take::Speech, Take::Speech, Take::Speech],
        vec![
            Err(CaptureError::UnintelligibleAudio),
            Err(CaptureError::Transcription("503".into())),
            Ok("bye".into()),
        ],
        vec![],
    );
    let mut controller = controller(dir.path(), &mocks);

    assert_eq!(
        controller.run_turn().await.unwrap(),
        TurnOutcome::Retry(CaptureError::NoSpeechDetected)
    );
    assert_eq!(controller.state(), TurnState::Idle);

    assert_eq!(
        controller.run_turn().await.unwrap(),
        TurnOutcome::Retry(CaptureError::UnintelligibleAudio)
    );
    // Only unintelligible audio gets a spoken apology
    assert_eq!(mocks.player.played(), vec!["Sorry, I didn't catch that."]);

    assert!(matches!(
        controller.run_turn().await.unwrap(),
        TurnOutcome::Retry(CaptureError::Transcription(_))
    ));

    assert!(matches!(
        controller.run_turn().await.unwrap(),
        TurnOutcome::Responded(_)
    ));
    assert_eq!(mocks.recorder.calls(), 4);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_device_failures_escalate_after_bound() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::DeviceFailure; 5], vec![], vec![]);
    let mut controller = controller(dir.path(), &mocks);

    let result = controller.run().await;

    assert!(matches!(result, Err(Error::Capture(CaptureError::Device(_)))));
    assert_eq!(mocks.recorder.calls(), 3);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_device_failure_count_resets_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(
        vec![
            Take::DeviceFailure,
            Take::DeviceFailure,
            Take::Silence,
            Take::DeviceFailure,
            Take::DeviceFailure,
            Take::Speech,
        ],
        vec![Ok("exit".into())],
        vec![],
    );
    let mut controller = controller(dir.path(), &mocks);

    controller.run().await.unwrap();

    assert_eq!(mocks.recorder.calls(), 6);
    assert_eq!(controller.state(), TurnState::Terminated);
}

#[tokio::test]
async fn test_generation_failure_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(
        vec![Take::Speech, Take::Speech],
        vec![Ok("hello".into()), Ok("hello again".into())],
        vec![
            Err(GenerationError::ServiceUnavailable("connection refused".into())),
            Ok(vec![
                Ok("Partly there. ".into()),
                Ok("And then".into()),
                Err(GenerationError::StreamInterrupted("reset".into())),
            ]),
        ],
    );
    let transcript = Transcript::memory();
    let mut controller = controller(dir.path(), &mocks).with_transcript(transcript.clone());

    let outcome = controller.run_turn().await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed(GenerationError::ServiceUnavailable(_))));
    assert_eq!(controller.state(), TurnState::Idle);
    assert!(mocks.player.played().is_empty());

    let outcome = controller.run_turn().await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed(GenerationError::StreamInterrupted(_))));
    assert_eq!(controller.state(), TurnState::Idle);
    assert_eq!(mocks.player.played(), vec!["Partly there."]);

    assert!(transcript.contents().contains("[System] Response failed"));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_shutdown_cancels_turn_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::Hang], vec![], vec![]);
    let mut controller = controller(dir.path(), &mocks);

    controller
        .run_until(tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    assert_eq!(controller.state(), TurnState::Terminated);
    assert_eq!(mocks.recorder.calls(), 1);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_state_transitions_are_observable() {
    let dir = tempfile::tempdir().unwrap();
    let mocks = mocks(vec![Take::Speech], vec![Ok("quit".into())], vec![]);
    let mut controller = controller(dir.path(), &mocks);
    let mut rx = controller.subscribe();

    assert_eq!(*rx.borrow_and_update(), TurnState::Idle);
    controller.run_turn().await.unwrap();

    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), TurnState::Terminated);
}

/// Stand-in recorder program plus the fixture files it copies from
#[cfg(unix)]
fn command_recorder(bin: &std::path::Path, body: &str) -> CommandRecorder {
    let speech = samples_to_wav(&generate_sine_samples(440.0, 1.0, 0.5), SAMPLE_RATE).unwrap();
    std::fs::write(bin.join("speech.wav"), speech).unwrap();
    std::fs::write(bin.join("header.wav"), header_only_wav()).unwrap();

    let program = common::stub_program(bin, "recorder", body);
    CommandRecorder::new(program.to_string_lossy())
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_recorder_failure_exit_is_device_error() {
    let bin = tempfile::tempdir().unwrap();
    let dest = bin.path().join("take.wav");
    let body = format!("cat {}/speech.wav > \"$last\"\nexit 1", bin.path().display());
    let recorder = command_recorder(bin.path(), &body);

    let result = recorder.record(&dest, Duration::from_secs(5)).await;

    assert!(matches!(result, Err(CaptureError::Device(msg)) if msg.contains("exited with code 1")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_recorder_stopped_at_limit_is_success() {
    let bin = tempfile::tempdir().unwrap();
    let dest = bin.path().join("take.wav");
    let body = format!("cat {}/speech.wav > \"$last\"\nexec sleep 10", bin.path().display());
    let recorder = command_recorder(bin.path(), &body);

    recorder.record(&dest, Duration::from_millis(300)).await.unwrap();

    assert!(std::fs::metadata(&dest).unwrap().len() > 44);
}

#[cfg(unix)]
#[tokio::test]
async fn test_header_only_recording_is_device_error() {
    let bin = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let body = format!("cat {}/header.wav > \"$last\"", bin.path().display());
    let recorder = command_recorder(bin.path(), &body);
    let mocks = mocks(vec![], vec![], vec![]);

    let session = CaptureSession::new(
        Arc::new(recorder),
        mocks.transcriber.clone(),
        dir.path(),
        Duration::from_secs(5),
    );
    let result = session.capture().await;

    assert!(matches!(result, Err(CaptureError::Device(msg)) if msg.contains("no audio")));
    assert_eq!(*mocks.transcriber.calls.lock().unwrap(), 0);
    assert!(files_in(dir.path()).is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_broken_command_recorder_escalates() {
    let bin = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let body = format!("cat {}/header.wav > \"$last\"\nexit 1", bin.path().display());
    let recorder = command_recorder(bin.path(), &body);
    let mocks = mocks(vec![], vec![], vec![]);

    let mut backends = mocks.backends();
    backends.recorder = Arc::new(recorder);
    let mut config = test_config(dir.path());
    config.voice.capture_timeout = Duration::from_secs(5);
    let mut controller = TurnController::new(&config, backends)
        .unwrap()
        .with_transcript(Transcript::silent());

    let result = controller.run().await;

    assert!(matches!(result, Err(Error::Capture(CaptureError::Device(_)))));
    assert_eq!(*mocks.transcriber.calls.lock().unwrap(), 0);
    assert!(files_in(dir.path()).is_empty());
}
