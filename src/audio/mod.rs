//! Microphone capture and voice activity detection for the caption pipeline.
//!
//! Audio is captured via CPAL in fixed-size frames, resampled to 16kHz mono
//! (Whisper's expected format), and segmented into utterances by the VAD so
//! the recognizer can transcribe while the user keeps talking.

/// Target sample rate for Whisper STT.
pub const TARGET_RATE: u32 = 16_000;

/// Target channel count for Whisper STT.
pub const TARGET_CHANNELS: u32 = 1;

mod dispatch;
mod frames;
mod meter;
mod recorder;
mod resample;
#[cfg(test)]
mod tests;
mod vad;

pub use frames::{UtteranceCut, UtteranceState};
pub use meter::LiveMeter;
pub use recorder::{FrameStream, Recorder};
pub(crate) use frames::UtteranceAccumulator;
pub(crate) use meter::rms_db;
pub(crate) use resample::convert_frame_to_target;
pub use vad::{SimpleThresholdVad, VadConfig, VadDecision, VadEngine};
pub(crate) use vad::{FrameLabel, VadSmoother};
