//! Caption pipeline: local speech out, peer transcripts in.
//!
//! While a call is active the pipeline runs the continuous recognizer.
//! Interim results only feed the local "currently speaking" preview; final
//! results are handed to the session for transmission, verbatim, with no
//! translation on the sending side. Incoming transcripts are translated into
//! the locally selected language and displayed, falling back to the original
//! text whenever the service misbehaves. Translation outcomes are tagged with
//! a call epoch; anything that lands after the call ended is discarded.

use crate::audio::{LiveMeter, Recorder};
use crate::config::CaptionPipelineConfig;
use crate::lang::TargetLang;
use crate::log_debug;
use crate::speech::{self, Recognizer, SessionEnd, SpeechEvent, SpeechToText};
use crate::translate::{start_translation_job, TranslationJob, Translator};
use std::sync::{Arc, Mutex};

/// Caption shown before anyone has spoken (and again after a call ends).
pub const WAITING_CAPTION: &str = "🎤 Waiting for speech...";
const INTERIM_MARKER: &str = "🎙️";
const CAPTION_MARKER: &str = "📝";

/// What the session controller needs to act on after a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionEvent {
    /// A finalized transcript to send over the data channel.
    Outbound(String),
    /// The recognition session expired and was restarted.
    Restarted,
    /// The speech engine reported a problem.
    EngineError(String),
}

/// Pipeline state machine: `stopped` until a call starts it, `listening`
/// while the recognizer runs, back to `stopped` on call end or mic mute.
pub struct CaptionPipeline {
    cfg: CaptionPipelineConfig,
    translator: Arc<Translator>,
    target_lang: TargetLang,
    caption: String,
    meter: LiveMeter,
    recognizer: Option<Recognizer>,
    recorder: Option<Arc<Mutex<Recorder>>>,
    transcriber: Option<Arc<dyn SpeechToText>>,
    translations: Vec<TranslationJob>,
    epoch: u64,
    /// Mic-muted state, remembered across recognizer restarts.
    muted: bool,
}

impl CaptionPipeline {
    pub fn new(
        cfg: CaptionPipelineConfig,
        translator: Arc<Translator>,
        target_lang: TargetLang,
    ) -> Self {
        Self {
            cfg,
            translator,
            target_lang,
            caption: WAITING_CAPTION.to_string(),
            meter: LiveMeter::new(),
            recognizer: None,
            recorder: None,
            transcriber: None,
            translations: Vec::new(),
            epoch: 0,
            muted: false,
        }
    }

    /// Install the speech-to-text backend (loaded lazily at startup because
    /// the model can take seconds).
    pub fn set_transcriber(&mut self, transcriber: Arc<dyn SpeechToText>) {
        self.transcriber = Some(transcriber);
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn target_lang(&self) -> TargetLang {
        self.target_lang
    }

    /// Change the display language. Applies from the next incoming
    /// transcript; an in-flight request keeps the language it started with.
    pub fn set_target_lang(&mut self, lang: TargetLang) {
        self.target_lang = lang;
    }

    pub fn meter(&self) -> LiveMeter {
        self.meter.clone()
    }

    pub fn is_listening(&self) -> bool {
        self.recognizer
            .as_ref()
            .map(|recognizer| !recognizer.is_paused())
            .unwrap_or(false)
    }

    /// Begin captioning for a call. Returns false when the speech engine is
    /// unavailable (no microphone or no model); the call proceeds without
    /// outgoing captions.
    pub fn start(&mut self, recorder: Option<Arc<Mutex<Recorder>>>) -> bool {
        self.recorder = recorder;
        self.caption = WAITING_CAPTION.to_string();
        self.spawn_recognizer()
    }

    fn spawn_recognizer(&mut self) -> bool {
        let (Some(recorder), Some(transcriber)) = (self.recorder.clone(), self.transcriber.clone())
        else {
            log_debug("caption engine unavailable (missing recorder or model)");
            return false;
        };
        let recognizer = speech::start_recognizer(
            recorder,
            transcriber,
            self.cfg.clone(),
            Some(self.meter.clone()),
        );
        // A restart must not undo a mute.
        if self.muted {
            recognizer.pause();
        }
        self.recognizer = Some(recognizer);
        true
    }

    /// Stop captioning and reset the display. Bumping the epoch makes any
    /// still-running translation worker's result land dead.
    pub fn stop(&mut self) {
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
        }
        self.recorder = None;
        self.caption = WAITING_CAPTION.to_string();
        self.muted = false;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Mic muted: recognition suspends, nothing is transmitted.
    pub fn pause_recognition(&mut self) {
        self.muted = true;
        if let Some(recognizer) = self.recognizer.as_ref() {
            recognizer.pause();
        }
    }

    pub fn resume_recognition(&mut self) {
        self.muted = false;
        if let Some(recognizer) = self.recognizer.as_ref() {
            recognizer.resume();
        }
    }

    /// Drain recognizer events. `call_active` gates both transmission and the
    /// transparent session restart.
    pub fn poll(&mut self, call_active: bool) -> Vec<CaptionEvent> {
        let mut actions = Vec::new();
        let mut restart = false;
        let mut engine_done = false;

        if let Some(recognizer) = self.recognizer.as_ref() {
            while let Ok(event) = recognizer.events.try_recv() {
                match event {
                    SpeechEvent::Started => {}
                    SpeechEvent::Result {
                        text, is_final, ..
                    } => {
                        self.caption = format!("{INTERIM_MARKER} {text}");
                        if is_final && call_active {
                            actions.push(CaptionEvent::Outbound(text));
                        }
                    }
                    SpeechEvent::Ended { reason } => match reason {
                        SessionEnd::Expired => {
                            engine_done = true;
                            restart = call_active;
                        }
                        SessionEnd::Stopped => {
                            engine_done = true;
                        }
                    },
                    SpeechEvent::Error(message) => {
                        actions.push(CaptionEvent::EngineError(message));
                    }
                }
            }
        }

        if engine_done {
            if let Some(mut recognizer) = self.recognizer.take() {
                recognizer.stop();
            }
            if restart {
                // Browsers cut continuous recognition off periodically; the
                // restart is transparent beyond a status flicker.
                if self.spawn_recognizer() {
                    actions.push(CaptionEvent::Restarted);
                } else {
                    actions.push(CaptionEvent::EngineError(
                        "caption engine unavailable".to_string(),
                    ));
                }
            }
        }

        actions
    }

    /// Text arrived on the data channel: translate it into the currently
    /// selected language. Empty payloads are ignored.
    pub fn handle_incoming(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let job = start_translation_job(
            self.translator.clone(),
            text.to_string(),
            self.target_lang,
            self.epoch,
        );
        self.translations.push(job);
    }

    /// Apply finished translations in arrival order (last write wins) and
    /// drop results that belong to an ended call.
    pub fn poll_translations(&mut self) -> bool {
        let mut changed = false;
        let current_epoch = self.epoch;
        let mut caption = None;
        self.translations.retain_mut(|job| {
            match job.receiver.try_recv() {
                Ok(outcome) => {
                    if let Some(handle) = job.handle.take() {
                        let _ = handle.join();
                    }
                    if outcome.epoch == current_epoch {
                        caption = Some(format!("{CAPTION_MARKER} {}", outcome.caption));
                    } else {
                        log_debug("discarding translation outcome from an ended call");
                    }
                    false
                }
                Err(std::sync::mpsc::TryRecvError::Empty) => true,
                Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                    if let Some(handle) = job.handle.take() {
                        let _ = handle.join();
                    }
                    false
                }
            }
        });
        if let Some(caption) = caption {
            self.caption = caption;
            changed = true;
        }
        changed
    }

    pub fn has_pending_translations(&self) -> bool {
        !self.translations.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn attach_recognizer_for_tests(
        &mut self,
        events: crossbeam_channel::Receiver<SpeechEvent>,
    ) {
        self.recognizer = Some(speech::recognizer_for_tests(events));
    }
}
