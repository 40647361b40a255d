//! Voice component integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use parley::error::CaptureError;
use parley::voice::{
    ActivityState, SAMPLE_RATE, TransientArtifact, VoiceActivityDetector, calculate_rms,
    classify_transcript, decode_audio, samples_to_wav, wav_to_samples,
};

mod common;

use common::{generate_silence, generate_sine_samples};

#[test]
fn test_detector_starts_waiting() {
    let mut detector = VoiceActivityDetector::default();

    assert!(!detector.heard_speech());
    assert_eq!(detector.process(&[]), ActivityState::Waiting);
}

#[test]
fn test_speech_activity_detection() {
    let mut detector = VoiceActivityDetector::new(0.03);

    // Silent samples - should not trigger
    let silence = generate_silence(0.1);
    assert_eq!(detector.process(&silence), ActivityState::Waiting);

    // Loud samples - should start speaking
    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    assert_eq!(detector.process(&speech), ActivityState::Speaking);

    // Trailing silence completes the utterance
    let silence = generate_silence(0.9);
    assert_eq!(detector.process(&silence), ActivityState::Complete);
    assert!(detector.heard_speech());
}

#[test]
fn test_short_blip_is_not_an_utterance() {
    let mut detector = VoiceActivityDetector::new(0.03);

    // 50ms of noise, then a long pause
    assert_eq!(
        detector.process(&generate_sine_samples(440.0, 0.05, 0.3)),
        ActivityState::Speaking
    );
    assert_ne!(detector.process(&generate_silence(0.9)), ActivityState::Complete);
    assert_eq!(detector.process(&generate_silence(1.0)), ActivityState::Waiting);
}

#[test]
fn test_calibration_raises_threshold() {
    let mut detector = VoiceActivityDetector::new(0.01);
    let threshold = detector.calibrate(&generate_sine_samples(100.0, 0.5, 0.1));
    assert!(threshold > 0.01);

    // Audio below the calibrated level no longer counts as speech
    assert_eq!(
        detector.process(&generate_sine_samples(100.0, 0.5, 0.1)),
        ActivityState::Waiting
    );
}

#[test]
fn test_calibration_never_lowers_threshold() {
    let mut detector = VoiceActivityDetector::new(0.05);
    let threshold = detector.calibrate(&generate_silence(0.5));
    assert!((threshold - 0.05).abs() < f32::EPSILON);
}

#[test]
fn test_contains_speech() {
    let detector = VoiceActivityDetector::new(0.03);

    assert!(!detector.contains_speech(&generate_silence(1.0)));
    assert!(!detector.contains_speech(&generate_sine_samples(440.0, 0.1, 0.5)));

    let mut take = generate_silence(0.5);
    take.extend(generate_sine_samples(440.0, 0.5, 0.5));
    take.extend(generate_silence(0.5));
    assert!(detector.contains_speech(&take));
}

#[test]
fn test_rms() {
    assert!(calculate_rms(&[]).abs() < f32::EPSILON);
    assert!((calculate_rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV header is 44 bytes
    assert!(wav_data.len() > 44);
}

#[test]
fn test_wav_roundtrip() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(&wav_data)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    let (samples, rate) = wav_to_samples(&wav_data).unwrap();
    assert_eq!(rate, SAMPLE_RATE);
    assert_eq!(samples.len(), original_samples.len());
    for (a, b) in samples.iter().zip(&original_samples) {
        assert!((a - b).abs() < 0.001, "{a} vs {b}");
    }
}

#[test]
fn test_stereo_wav_is_downmixed() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(i16::MAX / 2).unwrap();
            writer.write_sample(0_i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    let (samples, rate) = decode_audio(cursor.get_ref()).unwrap();
    assert_eq!(rate, 22050);
    assert_eq!(samples.len(), 10);
    assert!((samples[0] - 0.25).abs() < 0.01);
}

#[test]
fn test_transcript_classification() {
    assert_eq!(classify_transcript("  Hello there. ").unwrap(), "Hello there.");
    assert_eq!(classify_transcript(""), Err(CaptureError::UnintelligibleAudio));
    assert_eq!(classify_transcript(" ... "), Err(CaptureError::UnintelligibleAudio));
}

#[test]
fn test_artifact_removed_after_use() {
    let dir = tempfile::tempdir().unwrap();

    let path = tokio_test::block_on(async {
        let artifact = TransientArtifact::create(dir.path(), "wav").unwrap();
        tokio_test::assert_ok!(tokio::fs::write(artifact.path(), b"RIFF....WAVE").await);
        assert_eq!(tokio_test::assert_ok!(artifact.read().await).len(), 12);
        artifact.path().to_path_buf()
    });

    assert!(!path.exists());
    assert!(common::files_in(dir.path()).is_empty());
}
