//! Session controller: owns the call lifecycle and wires broker, caption
//! pipeline, and media handles together for the UI loop.
//!
//! All mutation happens on the UI thread; worker threads only ever talk to
//! the controller through channels drained by the `poll_*` methods.

use crate::broker::protocol::{SignalCommand, SignalEvent};
use crate::broker::SignalingLink;
use crate::captions::{CaptionEvent, CaptionPipeline};
use crate::config::AppConfig;
use crate::lang::TargetLang;
use crate::media::{LocalMedia, RemoteStream};
use crate::speech::SpeechToText;
use crate::stt;
use crate::translate::Translator;
use crate::{log_debug, log_debug_content};
use anyhow::{Context, Result};
#[cfg(test)]
use std::sync::{Mutex, OnceLock};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status pulse lengths, matching the reference behavior: a short "call
/// ended" beat, a quick sending flash, a longer copy confirmation.
const ENDED_PULSE: Duration = Duration::from_millis(500);
const SENDING_PULSE: Duration = Duration::from_millis(1_200);
const COPIED_PULSE: Duration = Duration::from_millis(2_000);
const RESTART_FLICKER: Duration = Duration::from_millis(600);

const STATUS_INITIALIZING: &str = "Initializing...";
const STATUS_READY: &str = "✅ Ready to connect";
const STATUS_CALLING: &str = "📞 Calling...";
const STATUS_INCOMING: &str = "📞 Incoming call...";
const STATUS_CONNECTED: &str = "✅ Connected";
const STATUS_LISTENING: &str = "🎤 Listening...";
const STATUS_MEDIA_DENIED: &str = "❌ Media access denied";
const STATUS_EMPTY_ADDRESS: &str = "⚠️ Please enter a friend address";
const STATUS_CALL_ENDED: &str = "Call ended";

/// Call lifecycle. At most one session per application instance; the data
/// channel exists only while the phase is `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Connecting,
    Active,
    Ended,
}

/// Central application state shared between the event loop and the renderer.
pub struct App {
    config: AppConfig,
    broker: Arc<dyn SignalingLink>,
    pipeline: CaptionPipeline,
    phase: CallPhase,
    my_address: Option<String>,
    address_input: String,
    remote_address: Option<String>,
    remote_stream: Option<RemoteStream>,
    local_media: Option<LocalMedia>,
    channel_open: bool,
    status: String,
    status_revert: Option<(Instant, String)>,
    idle_at: Option<Instant>,
    transcriber_probe_done: bool,
    needs_redraw: bool,
}

impl App {
    pub fn new(config: AppConfig, broker: Arc<dyn SignalingLink>) -> Result<Self> {
        let translator = Arc::new(
            Translator::new(
                &config.translate_endpoint,
                Duration::from_millis(config.translate_timeout_ms),
            )
            .context("failed to initialize the translation client")?,
        );
        let pipeline = CaptionPipeline::new(
            config.caption_pipeline_config(),
            translator,
            config.target_lang,
        );
        Ok(Self {
            config,
            broker,
            pipeline,
            phase: CallPhase::Idle,
            my_address: None,
            address_input: String::new(),
            remote_address: None,
            remote_stream: None,
            local_media: None,
            channel_open: false,
            status: STATUS_INITIALIZING.to_string(),
            status_revert: None,
            idle_at: None,
            transcriber_probe_done: false,
            needs_redraw: true,
        })
    }

    // ------------------------------------------------------------------
    // Accessors for the renderer
    // ------------------------------------------------------------------

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    pub fn caption(&self) -> &str {
        self.pipeline.caption()
    }

    pub fn my_address(&self) -> Option<&str> {
        self.my_address.as_deref()
    }

    pub fn address_input(&self) -> &str {
        &self.address_input
    }

    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    pub fn target_lang(&self) -> TargetLang {
        self.pipeline.target_lang()
    }

    pub fn mic_enabled(&self) -> bool {
        self.local_media
            .as_ref()
            .map(|media| media.audio().enabled())
            .unwrap_or(false)
    }

    pub fn camera_enabled(&self) -> bool {
        self.local_media
            .as_ref()
            .map(|media| media.video().enabled())
            .unwrap_or(false)
    }

    pub fn mic_meter(&self) -> crate::audio::LiveMeter {
        self.pipeline.meter()
    }

    pub fn captions_listening(&self) -> bool {
        self.pipeline.is_listening()
    }

    pub fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    pub fn take_redraw_request(&mut self) -> bool {
        let requested = self.needs_redraw;
        self.needs_redraw = false;
        requested
    }

    /// Anything in flight that warrants the fast poll cadence.
    pub fn has_active_work(&self) -> bool {
        self.phase != CallPhase::Idle
            || self.pipeline.has_pending_translations()
            || self.status_revert.is_some()
            || self.idle_at.is_some()
    }

    // ------------------------------------------------------------------
    // Address input (pre-call screen)
    // ------------------------------------------------------------------

    pub fn push_address_char(&mut self, ch: char) {
        if !ch.is_control() {
            self.address_input.push(ch);
            self.request_redraw();
        }
    }

    pub fn backspace_address(&mut self) {
        self.address_input.pop();
        self.request_redraw();
    }

    pub fn clear_address(&mut self) {
        self.address_input.clear();
        self.request_redraw();
    }

    /// Copy action: hand the address to the renderer (which owns the
    /// clipboard escape) and pulse a confirmation.
    pub fn copy_address(&mut self) -> Option<String> {
        let address = self.my_address.clone()?;
        self.set_status_pulse("✅ Address copied to clipboard!", COPIED_PULSE, STATUS_READY);
        Some(address)
    }

    // ------------------------------------------------------------------
    // Call lifecycle
    // ------------------------------------------------------------------

    /// Dial the peer in the address input. No-op with a validation status
    /// when the input is empty.
    pub fn start_call(&mut self) {
        if self.phase != CallPhase::Idle {
            self.set_status("Already in a call.");
            return;
        }
        let remote = self.address_input.trim().to_string();
        if remote.is_empty() {
            self.set_status(STATUS_EMPTY_ADDRESS);
            return;
        }

        let media = match self.acquire_media() {
            Ok(media) => media,
            Err(err) => {
                log_debug(&format!("media capture failed: {err:#}"));
                self.set_status(STATUS_MEDIA_DENIED);
                return;
            }
        };
        self.local_media = Some(media);

        let call = SignalCommand::Call {
            to: remote.clone(),
        };
        let connect = SignalCommand::Connect {
            to: remote.clone(),
        };
        if let Err(err) = self
            .broker
            .send(call)
            .and_then(|_| self.broker.send(connect))
        {
            log_debug(&format!("broker send failed: {err:#}"));
            self.abort_call_setup("⚠️ Broker unreachable");
            return;
        }

        log_debug_content(&format!("calling {remote}"));
        tracing::info!(event = "call_dialed");
        self.remote_address = Some(remote);
        self.phase = CallPhase::Connecting;
        self.set_status(STATUS_CALLING);
    }

    /// Inbound call: acquire media, answer, go active. The caller opens the
    /// data channel; we learn about it through a `Connection` event.
    fn accept_incoming(&mut self, from: String) {
        if self.phase != CallPhase::Idle {
            log_debug(&format!("ignoring incoming call from {from} while busy"));
            return;
        }
        self.set_status(STATUS_INCOMING);

        let media = match self.acquire_media() {
            Ok(media) => media,
            Err(err) => {
                log_debug(&format!("media capture failed: {err:#}"));
                self.set_status(STATUS_MEDIA_DENIED);
                return;
            }
        };
        self.local_media = Some(media);

        if let Err(err) = self.broker.send(SignalCommand::Answer { to: from.clone() }) {
            log_debug(&format!("failed to answer call: {err:#}"));
            self.abort_call_setup("⚠️ Broker unreachable");
            return;
        }

        log_debug_content(&format!("answered call from {from}"));
        tracing::info!(event = "call_active", role = "callee");
        self.remote_address = Some(from);
        self.phase = CallPhase::Active;
        self.set_status(STATUS_CONNECTED);
        self.begin_captions();
    }

    /// Tear the call down. Idempotent: calling it again (or after the peer
    /// hung up) does nothing.
    pub fn end_call(&mut self) {
        if matches!(self.phase, CallPhase::Idle | CallPhase::Ended) {
            return;
        }

        self.pipeline.stop();
        if let Some(media) = self.local_media.as_mut() {
            media.stop_all();
        }
        if let Some(remote) = self.remote_address.take() {
            // The peer may already be gone; nothing to do about a failed
            // hangup beyond logging it.
            if let Err(err) = self.broker.send(SignalCommand::Hangup { to: remote }) {
                log_debug(&format!("hangup send failed: {err:#}"));
            }
        }
        tracing::info!(event = "call_ended");
        self.channel_open = false;
        self.remote_stream = None;
        self.address_input.clear();
        self.phase = CallPhase::Ended;
        self.status_revert = None;
        self.set_status(STATUS_CALL_ENDED);
        self.idle_at = Some(Instant::now() + ENDED_PULSE);
    }

    /// Full shutdown on quit: end any call and drop the broker connection.
    pub fn shutdown(&mut self) {
        self.end_call();
        self.broker.close();
    }

    fn abort_call_setup(&mut self, status: &str) {
        if let Some(media) = self.local_media.as_mut() {
            media.stop_all();
        }
        self.local_media = None;
        self.remote_address = None;
        self.set_status(status);
    }

    // ------------------------------------------------------------------
    // Toggles
    // ------------------------------------------------------------------

    /// Mic toggle. Muting also suspends recognition so nothing is
    /// transcribed or transmitted until unmuted.
    pub fn toggle_mic(&mut self) {
        let Some(media) = self.local_media.as_mut() else {
            return;
        };
        let enabled = media.toggle_audio();
        if enabled {
            self.pipeline.resume_recognition();
            self.set_status(STATUS_LISTENING);
        } else {
            self.pipeline.pause_recognition();
            self.set_status("🔇 Mic muted");
        }
        self.send_track_state();
    }

    pub fn toggle_camera(&mut self) {
        let Some(media) = self.local_media.as_mut() else {
            return;
        };
        let enabled = media.toggle_video();
        self.set_status(if enabled {
            "📷 Camera on"
        } else {
            "📹 Camera off"
        });
        self.send_track_state();
    }

    fn send_track_state(&mut self) {
        let Some(remote) = self.remote_address.clone() else {
            return;
        };
        let command = SignalCommand::TrackState {
            to: remote,
            audio: self.mic_enabled(),
            video: self.camera_enabled(),
        };
        if let Err(err) = self.broker.send(command) {
            log_debug(&format!("track-state send failed: {err:#}"));
        }
    }

    /// Cycle the caption display language.
    pub fn cycle_language(&mut self) {
        let next = self.pipeline.target_lang().next();
        self.pipeline.set_target_lang(next);
        self.set_status(&format!("Translate to: {}", next.label()));
    }

    // ------------------------------------------------------------------
    // Event pumps
    // ------------------------------------------------------------------

    /// Drain broker events into state changes.
    pub fn poll_broker_events(&mut self) {
        while let Some(event) = self.broker.try_event() {
            self.handle_broker_event(event);
        }
    }

    fn handle_broker_event(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::Open { address } => {
                log_debug(&format!("broker assigned address {address}"));
                self.my_address = Some(address);
                if self.phase == CallPhase::Idle {
                    self.set_status(STATUS_READY);
                } else {
                    self.request_redraw();
                }
            }
            SignalEvent::IncomingCall { from } => {
                self.accept_incoming(from);
            }
            SignalEvent::Stream { from, audio, video } => {
                if self.is_current_peer(&from) {
                    self.remote_stream = Some(RemoteStream {
                        from,
                        audio_enabled: audio,
                        video_enabled: video,
                    });
                    self.request_redraw();
                }
            }
            SignalEvent::Connection { from } => {
                // Callee side: the caller opened the data channel to us.
                if self.is_current_peer(&from) && self.phase == CallPhase::Active {
                    self.channel_open = true;
                    self.set_status(STATUS_CONNECTED);
                }
            }
            SignalEvent::ChannelOpen { with } => {
                // Caller side: our data channel is up, the call is live.
                if self.is_current_peer(&with) && self.phase == CallPhase::Connecting {
                    tracing::info!(event = "call_active", role = "caller");
                    self.phase = CallPhase::Active;
                    self.channel_open = true;
                    self.set_status(STATUS_CONNECTED);
                    self.begin_captions();
                }
            }
            SignalEvent::Data { from, text } => {
                if self.phase == CallPhase::Active && self.is_current_peer(&from) {
                    self.pipeline.handle_incoming(&text);
                    self.request_redraw();
                }
            }
            SignalEvent::TrackState { from, audio, video } => {
                if self.is_current_peer(&from) {
                    if let Some(stream) = self.remote_stream.as_mut() {
                        stream.audio_enabled = audio;
                        stream.video_enabled = video;
                        self.request_redraw();
                    }
                }
            }
            SignalEvent::Closed { from } => {
                if self.is_current_peer(&from) {
                    log_debug("peer closed the call");
                    self.end_call();
                }
            }
            SignalEvent::Error { message } => {
                log_debug(&format!("broker error: {message}"));
                self.set_status(&format!("⚠️ {message}"));
            }
        }
    }

    /// Drain recognizer output: previews, outbound transcripts, restarts.
    pub fn poll_caption_events(&mut self) {
        let call_active = self.phase == CallPhase::Active;
        let events = self.pipeline.poll(call_active);
        if !events.is_empty() {
            self.request_redraw();
        }
        for event in events {
            match event {
                CaptionEvent::Outbound(text) => self.send_transcript(text),
                CaptionEvent::Restarted => {
                    self.set_status_pulse(
                        "🎤 Restarting captions...",
                        RESTART_FLICKER,
                        STATUS_LISTENING,
                    );
                }
                CaptionEvent::EngineError(message) => {
                    self.set_status(&format!("⚠️ Caption error: {message}"));
                }
            }
        }
        if self.pipeline.poll_translations() {
            self.request_redraw();
        }
    }

    fn send_transcript(&mut self, text: String) {
        if !(self.channel_open && self.phase == CallPhase::Active && self.mic_enabled()) {
            return;
        }
        let Some(remote) = self.remote_address.clone() else {
            return;
        };
        log_debug_content(&format!("sending transcript: {text}"));
        match self.broker.send(SignalCommand::Send { to: remote, text }) {
            Ok(()) => {
                self.set_status_pulse("✅ Sending...", SENDING_PULSE, STATUS_LISTENING);
            }
            Err(err) => {
                log_debug(&format!("transcript send failed: {err:#}"));
                self.set_status("⚠️ Connection lost");
            }
        }
    }

    /// Timer-driven transitions: status pulses and the ended-to-idle beat.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn tick_at(&mut self, now: Instant) {
        if let Some((deadline, revert_to)) = self.status_revert.take() {
            if now >= deadline {
                self.status = revert_to;
                self.request_redraw();
            } else {
                self.status_revert = Some((deadline, revert_to));
            }
        }
        if let Some(deadline) = self.idle_at {
            if now >= deadline {
                self.idle_at = None;
                self.local_media = None;
                self.phase = CallPhase::Idle;
                self.set_status(if self.my_address.is_some() {
                    STATUS_READY
                } else {
                    STATUS_INITIALIZING
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn is_current_peer(&self, address: &str) -> bool {
        self.remote_address.as_deref() == Some(address)
    }

    fn begin_captions(&mut self) {
        self.probe_transcriber();
        let recorder = self.local_media.as_ref().and_then(|media| media.recorder());
        if self.pipeline.start(recorder) {
            self.set_status(STATUS_LISTENING);
        } else {
            // The call carries on; only outgoing captions are missing.
            log_debug("captions disabled for this call");
        }
    }

    /// Load the Whisper model once, lazily, because it can take seconds.
    fn probe_transcriber(&mut self) {
        if self.transcriber_probe_done {
            return;
        }
        self.transcriber_probe_done = true;
        let Some(model_path) = self.config.whisper_model_path.clone() else {
            log_debug("no whisper model configured; captions stay off");
            return;
        };
        match stt::Transcriber::new(&model_path) {
            Ok(transcriber) => {
                let transcriber: Arc<dyn SpeechToText> = Arc::new(transcriber);
                self.pipeline.set_transcriber(transcriber);
            }
            Err(err) => {
                log_debug(&format!("failed to load whisper model: {err:#}"));
                self.set_status("⚠️ Caption model failed to load");
            }
        }
    }

    fn acquire_media(&self) -> Result<LocalMedia> {
        #[cfg(test)]
        {
            if let Some(storage) = MEDIA_HOOK.get() {
                let guard = storage.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(hook) = guard.as_ref() {
                    return hook(&self.config);
                }
            }
        }
        LocalMedia::capture(&self.config)
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
        self.status_revert = None;
        self.request_redraw();
    }

    fn set_status_pulse(&mut self, status: &str, duration: Duration, revert_to: &str) {
        self.status = status.to_string();
        self.status_revert = Some((Instant::now() + duration, revert_to.to_string()));
        self.request_redraw();
    }

    #[cfg(test)]
    pub(crate) fn pipeline_mut(&mut self) -> &mut CaptionPipeline {
        &mut self.pipeline
    }

    #[cfg(test)]
    pub(crate) fn local_tracks_stopped(&self) -> Option<bool> {
        self.local_media.as_ref().map(|media| media.all_stopped())
    }
}

#[cfg(test)]
type MediaHook = Box<dyn Fn(&AppConfig) -> Result<LocalMedia> + Send + 'static>;

#[cfg(test)]
static MEDIA_HOOK: OnceLock<Mutex<Option<MediaHook>>> = OnceLock::new();

#[cfg(test)]
fn set_media_hook(hook: Option<MediaHook>) {
    let storage = MEDIA_HOOK.get_or_init(|| Mutex::new(None));
    *storage.lock().unwrap_or_else(|e| e.into_inner()) = hook;
}
