use super::dispatch::{append_downmixed_samples, FrameDispatcher};
use super::frames::{UtteranceAccumulator, UtteranceCut, UtteranceState};
use super::resample::{
    adjust_frame_length, basic_resample, design_low_pass, downsampling_tap_count, resample_linear,
    resample_to_target_rate, MAX_DEVICE_RATE, MAX_RESAMPLE_RATIO, MIN_DEVICE_RATE,
    MIN_RESAMPLE_RATIO,
};
use super::vad::{FrameLabel, VadSmoother};
use super::{convert_frame_to_target, SimpleThresholdVad, VadConfig, VadDecision, VadEngine};
use super::{TARGET_RATE, TARGET_CHANNELS};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn speech_frame(len: usize) -> Vec<f32> {
    vec![0.5; len]
}

fn silence_frame(len: usize) -> Vec<f32> {
    vec![0.0005; len]
}

#[test]
fn target_format_is_whisper_compatible() {
    assert_eq!(TARGET_RATE, 16_000);
    assert_eq!(TARGET_CHANNELS, 1);
}

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    let samples = [0.1f32, 0.2, 0.3];
    append_downmixed_samples(&mut buf, &samples, 1, |sample| sample);
    assert_eq!(buf, samples);
}

#[test]
fn dispatcher_chunks_into_fixed_frames() {
    let (tx, rx) = bounded(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(4, tx, dropped.clone());

    dispatcher.push(&[0.1f32; 10], 1, |s| s);
    let first = rx.try_recv().expect("first frame");
    let second = rx.try_recv().expect("second frame");
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 4);
    // Two samples remain pending until the next callback fills the frame.
    assert!(rx.try_recv().is_err());
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_counts_dropped_frames_when_channel_full() {
    let (tx, rx) = bounded(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(2, tx, dropped.clone());

    dispatcher.push(&[0.1f32; 8], 1, |s| s);
    assert_eq!(rx.len(), 1);
    assert!(dropped.load(Ordering::Relaxed) > 0);
}

#[test]
fn threshold_vad_classifies_speech_and_silence() {
    let mut vad = SimpleThresholdVad::new(-40.0);
    assert_eq!(vad.process_frame(&speech_frame(320)), VadDecision::Speech);
    assert_eq!(vad.process_frame(&silence_frame(320)), VadDecision::Silence);
    assert_eq!(vad.process_frame(&[]), VadDecision::Uncertain);
}

#[test]
fn smoother_requires_majority_to_flip() {
    let mut smoother = VadSmoother::new(3);
    assert_eq!(smoother.smooth(FrameLabel::Speech), FrameLabel::Speech);
    assert_eq!(smoother.smooth(FrameLabel::Speech), FrameLabel::Speech);
    // One silence frame in a speech run stays speech by majority.
    assert_eq!(smoother.smooth(FrameLabel::Silence), FrameLabel::Speech);
    assert_eq!(smoother.smooth(FrameLabel::Silence), FrameLabel::Silence);
}

#[test]
fn utterance_closes_on_silence_after_speech() {
    let cfg = VadConfig {
        frame_ms: 20,
        silence_duration_ms: 100,
        max_utterance_ms: 10_000,
        min_speech_ms: 60,
        ..VadConfig::default()
    };
    let mut state = UtteranceState::new(&cfg, cfg.frame_ms);

    for _ in 0..5 {
        assert!(state.on_frame(FrameLabel::Speech).is_none());
    }
    for _ in 0..4 {
        assert!(state.on_frame(FrameLabel::Silence).is_none());
    }
    match state.on_frame(FrameLabel::Silence) {
        Some(UtteranceCut::Silence { tail_ms }) => assert_eq!(tail_ms, 100),
        other => panic!("expected silence cut, got {other:?}"),
    }
}

#[test]
fn utterance_does_not_close_in_a_quiet_room() {
    let cfg = VadConfig {
        frame_ms: 20,
        silence_duration_ms: 100,
        max_utterance_ms: 1_000,
        min_speech_ms: 60,
        ..VadConfig::default()
    };
    let mut state = UtteranceState::new(&cfg, cfg.frame_ms);

    // Pure silence never produces a silence cut; only the hard cap fires.
    for _ in 0..49 {
        assert!(state.on_frame(FrameLabel::Silence).is_none());
    }
    assert_eq!(
        state.on_frame(FrameLabel::Silence),
        Some(UtteranceCut::MaxDuration)
    );
}

#[test]
fn utterance_timeouts_advance_the_clock() {
    let cfg = VadConfig {
        frame_ms: 20,
        max_utterance_ms: 100,
        ..VadConfig::default()
    };
    let mut state = UtteranceState::new(&cfg, cfg.frame_ms);
    for _ in 0..4 {
        assert!(state.on_timeout().is_none());
    }
    assert_eq!(state.on_timeout(), Some(UtteranceCut::MaxDuration));
}

#[test]
fn accumulator_respects_sample_budget() {
    let mut acc = UtteranceAccumulator::for_testing(8, 0);
    for _ in 0..4 {
        acc.push_frame(vec![0.1; 4], FrameLabel::Speech);
    }
    let audio = acc.into_audio(&UtteranceCut::MaxDuration);
    assert_eq!(audio.len(), 8);
}

#[test]
fn accumulator_trims_trailing_silence_to_lookback() {
    let mut acc = UtteranceAccumulator::for_testing(1_000, 4);
    acc.push_frame(speech_frame(8), FrameLabel::Speech);
    acc.push_frame(silence_frame(8), FrameLabel::Silence);
    acc.push_frame(silence_frame(8), FrameLabel::Silence);

    let audio = acc.into_audio(&UtteranceCut::Silence { tail_ms: 320 });
    // 8 speech samples plus the 4-sample lookback of silence.
    assert_eq!(audio.len(), 12);
}

#[test]
fn accumulator_snapshot_leaves_frames_in_place() {
    let mut acc = UtteranceAccumulator::for_testing(1_000, 0);
    acc.push_frame(speech_frame(4), FrameLabel::Speech);
    let snapshot = acc.audio_snapshot();
    assert_eq!(snapshot.len(), 4);
    assert!(!acc.is_empty());
    let audio = acc.into_audio(&UtteranceCut::MaxDuration);
    assert_eq!(audio, snapshot);
}

#[test]
fn resample_linear_scales_length() {
    let input = vec![0.0f32, 1.0, 2.0, 3.0];
    let result = resample_linear(&input, 0.5);
    assert!(result.len() < input.len());
    assert!((result.first().copied().unwrap_or_default() - 0.0).abs() < 1e-6);
}

#[test]
fn resample_bounds_match_constants() {
    assert_eq!(MIN_DEVICE_RATE, 2_000);
    assert_eq!(MAX_DEVICE_RATE, 1_600_000);
    assert!((MIN_RESAMPLE_RATIO - 0.01).abs() < 1e-6);
    assert!((MAX_RESAMPLE_RATIO - 8.0).abs() < 1e-6);
}

#[test]
fn resample_to_target_rate_returns_input_when_rate_matches() {
    let input = vec![0.1f32, 0.2, 0.3];
    let output = resample_to_target_rate(&input, TARGET_RATE);
    assert_eq!(output, input);
}

#[test]
fn resample_to_target_rate_returns_empty_for_empty_input() {
    let input: Vec<f32> = Vec::new();
    let output = resample_to_target_rate(&input, 48_000);
    assert!(output.is_empty());
}

#[test]
fn basic_resample_halves_48k_audio() {
    let input: Vec<f32> = (0..960).map(|i| (i as f32 * 0.01).sin()).collect();
    let result = basic_resample(&input, 48_000);
    let expected = (input.len() as f32 / 3.0).round() as usize;
    let diff = (result.len() as isize - expected as isize).abs();
    assert!(diff <= 2, "expected ~{expected} samples, got {}", result.len());
}

#[test]
fn downsampling_tap_count_is_odd_and_bounded() {
    for rate in [22_050u32, 44_100, 48_000, 96_000, 1_600_000] {
        let taps = downsampling_tap_count(rate);
        assert!(taps % 2 == 1, "taps for {rate} should be odd");
        assert!(taps <= 129);
    }
}

#[test]
fn low_pass_design_is_normalized() {
    let coeffs = design_low_pass(0.25, 31);
    let sum: f32 = coeffs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4);
}

#[test]
fn convert_frame_pads_and_truncates_to_desired_length() {
    let frame = convert_frame_to_target(vec![0.5; 10], TARGET_RATE, TARGET_RATE, 16);
    assert_eq!(frame.len(), 16);
    let frame = convert_frame_to_target(vec![0.5; 20], TARGET_RATE, TARGET_RATE, 16);
    assert_eq!(frame.len(), 16);
}

#[test]
fn adjust_frame_length_pads_with_last_sample() {
    let frame = adjust_frame_length(vec![0.25, 0.75], 4);
    assert_eq!(frame, vec![0.25, 0.75, 0.75, 0.75]);
}
