//! Local and remote media handles.
//!
//! Capture, encoding, and transport live behind the broker; the session only
//! owns the device handles and their enabled/stopped flags. The microphone
//! doubles as the caption pipeline's input, so acquiring local media proves
//! mic access before a call is allowed to proceed.

use crate::audio::Recorder;
use crate::config::AppConfig;
use crate::log_debug;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One captured track. Mirrors the media-track contract: `enabled` can flip
/// during a call, `stop` releases the device for good.
#[derive(Debug)]
pub struct MediaTrack {
    kind: TrackKind,
    enabled: bool,
    stopped: bool,
}

impl MediaTrack {
    fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            enabled: true,
            stopped: false,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled && !self.stopped
    }

    /// Flip the track and report the new enabled state.
    pub fn toggle(&mut self) -> bool {
        if !self.stopped {
            self.enabled = !self.enabled;
        }
        self.enabled()
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// The locally captured stream: one audio and one video track, plus the
/// microphone recorder shared with the recognizer.
pub struct LocalMedia {
    audio: MediaTrack,
    video: MediaTrack,
    recorder: Option<Arc<Mutex<Recorder>>>,
}

impl LocalMedia {
    /// Acquire local capture. Failing to open the microphone is the
    /// media-access-denied case: the call must not proceed.
    pub fn capture(config: &AppConfig) -> Result<Self> {
        let recorder = Recorder::new(config.input_device.as_deref())
            .context("media access denied (microphone unavailable)")?;
        log_debug(&format!(
            "captured local media (mic: {})",
            recorder.device_name()
        ));
        Ok(Self {
            audio: MediaTrack::new(TrackKind::Audio),
            video: MediaTrack::new(TrackKind::Video),
            recorder: Some(Arc::new(Mutex::new(recorder))),
        })
    }

    /// Track bookkeeping without a device, for session tests on hosts with no
    /// microphone. Captions simply stay off when there is no recorder.
    #[cfg(test)]
    pub(crate) fn fake_for_tests() -> Self {
        Self {
            audio: MediaTrack::new(TrackKind::Audio),
            video: MediaTrack::new(TrackKind::Video),
            recorder: None,
        }
    }

    pub fn recorder(&self) -> Option<Arc<Mutex<Recorder>>> {
        self.recorder.clone()
    }

    pub fn audio(&self) -> &MediaTrack {
        &self.audio
    }

    pub fn video(&self) -> &MediaTrack {
        &self.video
    }

    pub fn toggle_audio(&mut self) -> bool {
        self.audio.toggle()
    }

    pub fn toggle_video(&mut self) -> bool {
        self.video.toggle()
    }

    /// Stop every track. Any live capture stream is owned (and closed) by the
    /// recognizer worker; dropping the last recorder handle releases the
    /// device itself.
    pub fn stop_all(&mut self) {
        self.audio.stop();
        self.video.stop();
        log_debug("local media tracks stopped");
    }

    pub fn all_stopped(&self) -> bool {
        self.audio.is_stopped() && self.video.is_stopped()
    }
}

/// The peer's stream as reported by the broker: which tracks are flowing and
/// whether the peer has muted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub from: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}
