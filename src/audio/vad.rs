//! Voice Activity Detection (VAD) for speech/silence classification.
//!
//! Processes audio frames and determines whether the user is speaking. The
//! recognizer uses the decisions to cut the frame stream into utterances.

use super::TARGET_RATE;
use crate::config::CaptionPipelineConfig;
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;

/// Configuration for silence-aware utterance segmentation.
#[derive(Debug, Clone)]
pub struct VadConfig {
    pub sample_rate: u32,
    pub frame_ms: u64,
    pub silence_threshold_db: f32,
    pub silence_duration_ms: u64,
    pub max_utterance_ms: u64,
    pub min_speech_ms: u64,
    pub lookback_ms: u64,
    pub buffer_ms: u64,
    pub channel_capacity: usize,
    pub smoothing_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_RATE,
            frame_ms: 20,
            silence_threshold_db: -45.0,
            silence_duration_ms: 600,
            max_utterance_ms: 10_000,
            min_speech_ms: 300,
            lookback_ms: 500,
            buffer_ms: 12_000,
            channel_capacity: 128,
            smoothing_frames: 3,
        }
    }
}

impl From<&CaptionPipelineConfig> for VadConfig {
    fn from(cfg: &CaptionPipelineConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            frame_ms: cfg.vad_frame_ms,
            silence_threshold_db: cfg.vad_threshold_db,
            silence_duration_ms: cfg.silence_tail_ms,
            max_utterance_ms: cfg.max_utterance_ms,
            min_speech_ms: cfg.min_speech_ms,
            lookback_ms: cfg.lookback_ms,
            buffer_ms: cfg.buffer_ms,
            channel_capacity: cfg.channel_capacity,
            smoothing_frames: cfg.vad_smoothing_frames,
        }
    }
}

/// Voice Activity Detection engine that processes audio frames.
///
/// # Frame Size Contract
/// Frame size in samples = (sample_rate * frame_duration_ms) / 1000.
/// Example: 20ms @ 16kHz = 320 samples. Callers must ensure frames passed to
/// `process_frame` match the engine's expected frame size.
pub trait VadEngine {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
    Uncertain,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FrameLabel {
    Speech,
    Silence,
    Uncertain,
}

impl From<VadDecision> for FrameLabel {
    fn from(decision: VadDecision) -> Self {
        match decision {
            VadDecision::Speech => FrameLabel::Speech,
            VadDecision::Silence => FrameLabel::Silence,
            VadDecision::Uncertain => FrameLabel::Uncertain,
        }
    }
}

/// Smooths VAD decisions using a sliding window majority vote.
///
/// Reduces false positives from brief noise spikes by requiring multiple
/// consecutive frames to agree before changing the speech/silence state.
pub(crate) struct VadSmoother {
    window: VecDeque<FrameLabel>,
    window_size: usize,
}

impl VadSmoother {
    pub(crate) fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::new(),
            window_size: window_size.max(1),
        }
    }

    /// Returns the majority label from the last `window_size` frames.
    pub(crate) fn smooth(&mut self, label: FrameLabel) -> FrameLabel {
        if self.window_size <= 1 {
            return label;
        }
        self.window.push_back(label);
        if self.window.len() > self.window_size {
            self.window.pop_front();
        }

        let mut speech = 0usize;
        let mut silence = 0usize;
        for item in &self.window {
            match item {
                FrameLabel::Speech => speech += 1,
                FrameLabel::Silence => silence += 1,
                FrameLabel::Uncertain => {}
            }
        }
        match speech.cmp(&silence) {
            CmpOrdering::Greater => FrameLabel::Speech,
            CmpOrdering::Less => FrameLabel::Silence,
            CmpOrdering::Equal => label,
        }
    }
}

/// RMS-energy VAD. A frame counts as speech when its level clears the
/// configured threshold.
#[derive(Debug, Clone)]
pub struct SimpleThresholdVad {
    threshold_db: f32,
}

impl SimpleThresholdVad {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }
}

impl VadEngine for SimpleThresholdVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let rms = energy.sqrt().max(1e-6);
        let db = 20.0 * rms.log10();
        if db >= self.threshold_db {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "simple_threshold_vad"
    }
}
