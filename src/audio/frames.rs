//! Utterance segmentation state machine.
//!
//! Accumulates labeled audio frames, tracks speech/silence durations, and
//! decides when the in-progress utterance is complete. The recognizer runs
//! one instance per utterance and transcribes the accumulated audio.

use super::vad::{FrameLabel, VadConfig};
use std::collections::VecDeque;

/// Why the in-progress utterance was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceCut {
    /// The speaker went quiet long enough to finalize.
    Silence { tail_ms: u64 },
    /// Hard cap reached; finalize whatever we have.
    MaxDuration,
    /// Recognition was paused or stopped mid-utterance.
    Interrupted,
    /// The recognition session's time budget ran out.
    SessionEnd,
    Error(String),
}

impl UtteranceCut {
    pub fn label(&self) -> &'static str {
        match self {
            UtteranceCut::Silence { .. } => "silence",
            UtteranceCut::MaxDuration => "max_duration",
            UtteranceCut::Interrupted => "interrupted",
            UtteranceCut::SessionEnd => "session_end",
            UtteranceCut::Error(_) => "error",
        }
    }
}

pub(crate) struct FrameRecord {
    samples: Vec<f32>,
    label: FrameLabel,
}

/// Rolling buffer of labeled frames with a hard sample budget and trailing
/// silence trimming.
pub(crate) struct UtteranceAccumulator {
    frames: VecDeque<FrameRecord>,
    total_samples: usize,
    max_samples: usize,
    lookback_samples: usize,
}

impl UtteranceAccumulator {
    pub(crate) fn from_config(cfg: &VadConfig) -> Self {
        let max_samples = ((cfg.buffer_ms * u64::from(cfg.sample_rate)) / 1000).max(1) as usize;
        let lookback_samples = ((cfg.lookback_ms * u64::from(cfg.sample_rate)) / 1000) as usize;
        Self {
            frames: VecDeque::new(),
            total_samples: 0,
            max_samples,
            lookback_samples,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_testing(max_samples: usize, lookback_samples: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            total_samples: 0,
            max_samples,
            lookback_samples,
        }
    }

    pub(crate) fn push_frame(&mut self, samples: Vec<f32>, label: FrameLabel) {
        self.total_samples = self.total_samples.saturating_add(samples.len());
        self.frames.push_back(FrameRecord { samples, label });
        while self.total_samples > self.max_samples {
            if let Some(record) = self.frames.pop_front() {
                self.total_samples = self.total_samples.saturating_sub(record.samples.len());
            } else {
                break;
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// Copy of the audio accumulated so far, for interim transcription while
    /// the utterance is still open.
    pub(crate) fn audio_snapshot(&self) -> Vec<f32> {
        let mut audio = Vec::with_capacity(self.total_samples);
        for record in &self.frames {
            audio.extend_from_slice(&record.samples);
        }
        audio
    }

    pub(crate) fn into_audio(mut self, cut: &UtteranceCut) -> Vec<f32> {
        if matches!(cut, UtteranceCut::Silence { .. }) {
            self.trim_trailing_silence();
        }
        let mut audio = Vec::with_capacity(self.total_samples);
        for record in self.frames {
            audio.extend(record.samples);
        }
        audio
    }

    pub(crate) fn trim_trailing_silence(&mut self) {
        let mut trailing_silence_samples = 0usize;
        for record in self.frames.iter().rev() {
            if record.label == FrameLabel::Silence {
                trailing_silence_samples += record.samples.len();
            } else {
                break;
            }
        }
        let excess = trailing_silence_samples.saturating_sub(self.lookback_samples);
        if excess == 0 {
            return;
        }
        let target_total = self.total_samples.saturating_sub(excess);
        loop {
            if self.total_samples <= target_total {
                break;
            }
            let (label, record_len) = match self.frames.back() {
                Some(record) => (record.label, record.samples.len()),
                None => break,
            };
            if label != FrameLabel::Silence {
                break;
            }
            if record_len == 0 {
                self.frames.pop_back();
                continue;
            }
            let remaining = self.total_samples.saturating_sub(target_total);
            let remove = remaining.min(record_len);
            if remove >= record_len {
                self.total_samples = self.total_samples.saturating_sub(record_len);
                self.frames.pop_back();
            } else {
                let keep = record_len - remove;
                if let Some(record) = self.frames.back_mut() {
                    record.samples.truncate(keep);
                }
                self.total_samples = self.total_samples.saturating_sub(remove);
            }
        }
    }
}

/// Tracks one utterance's progress and decides when to close it.
///
/// The state machine monitors:
/// - Total utterance duration (enforces the hard cap)
/// - Consecutive silence duration (finalizes after speech ends)
/// - Speech duration (no finalize before minimum speech)
pub struct UtteranceState<'a> {
    cfg: &'a VadConfig,
    frame_ms: u64,
    speech_ms: u64,
    silence_streak_ms: u64,
    total_ms: u64,
}

impl<'a> UtteranceState<'a> {
    pub fn new(cfg: &'a VadConfig, frame_ms: u64) -> Self {
        Self {
            cfg,
            frame_ms,
            speech_ms: 0,
            silence_streak_ms: 0,
            total_ms: 0,
        }
    }

    /// Processes a frame label and returns a cut reason if the utterance is done.
    ///
    /// Silence only closes the utterance after speech has been detected, so a
    /// quiet room does not produce a stream of empty finals.
    pub(crate) fn on_frame(&mut self, label: FrameLabel) -> Option<UtteranceCut> {
        match label {
            FrameLabel::Speech => {
                self.speech_ms = self.speech_ms.saturating_add(self.frame_ms);
                self.silence_streak_ms = 0;
            }
            FrameLabel::Silence => {
                self.silence_streak_ms = self.silence_streak_ms.saturating_add(self.frame_ms);
            }
            FrameLabel::Uncertain => {
                self.silence_streak_ms = 0;
            }
        }
        self.total_ms = self.total_ms.saturating_add(self.frame_ms);

        if self.total_ms >= self.cfg.max_utterance_ms {
            return Some(UtteranceCut::MaxDuration);
        }

        if self.speech_ms > 0
            && self.total_ms >= self.cfg.min_speech_ms
            && self.silence_streak_ms >= self.cfg.silence_duration_ms
        {
            return Some(UtteranceCut::Silence {
                tail_ms: self.silence_streak_ms,
            });
        }
        None
    }

    /// A receive timeout still advances the clock so a stalled device cannot
    /// hold an utterance open forever.
    pub(crate) fn on_timeout(&mut self) -> Option<UtteranceCut> {
        self.total_ms = self.total_ms.saturating_add(self.frame_ms);
        if self.total_ms >= self.cfg.max_utterance_ms {
            Some(UtteranceCut::MaxDuration)
        } else {
            None
        }
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub fn speech_ms(&self) -> u64 {
        self.speech_ms
    }

    pub fn silence_tail_ms(&self) -> u64 {
        self.silence_streak_ms
    }
}
