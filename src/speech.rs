//! Continuous speech recognition for the caption pipeline.
//!
//! A worker thread owns the microphone stream and cuts it into utterances
//! with the VAD. While an utterance is open the accumulated audio is
//! transcribed on a cadence and emitted as interim results; when the VAD
//! closes the utterance a final transcript is emitted. Each recognition
//! session has a bounded lifetime and reports its end, mirroring how browser
//! speech engines terminate continuous recognition; the caption pipeline
//! restarts the session while the call is active.

use crate::audio::{
    self, FrameLabel, FrameStream, LiveMeter, Recorder, SimpleThresholdVad, UtteranceAccumulator,
    UtteranceCut, UtteranceState, VadConfig, VadEngine, VadSmoother,
};
use crate::config::CaptionPipelineConfig;
use crate::stt;
use crate::{log_debug, log_debug_content};
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Events emitted by the recognizer, shaped after the browser speech API:
/// results carry a growing index and a final/interim flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Result {
        index: usize,
        text: String,
        is_final: bool,
    },
    Ended {
        reason: SessionEnd,
    },
    Error(String),
}

/// Why a recognition session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session's time budget ran out; restart to keep listening.
    Expired,
    /// Stopped on request (call ended); do not restart.
    Stopped,
}

/// Transcription seam so the session driver can run against a mock in tests.
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, samples: &[f32], lang: &str) -> Result<String>;
}

impl SpeechToText for stt::Transcriber {
    fn transcribe(&self, samples: &[f32], lang: &str) -> Result<String> {
        stt::Transcriber::transcribe(self, samples, lang)
    }
}

/// Handle the caption pipeline uses to drive the worker.
pub struct Recognizer {
    pub events: Receiver<SpeechEvent>,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Recognizer {
    /// Pause recognition (mic muted). The in-progress utterance is discarded.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Stop the worker and join it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Recognizer handle with no worker behind it, fed by the test itself.
#[cfg(test)]
pub(crate) fn recognizer_for_tests(events: Receiver<SpeechEvent>) -> Recognizer {
    Recognizer {
        events,
        paused: Arc::new(AtomicBool::new(false)),
        stop: Arc::new(AtomicBool::new(false)),
        handle: None,
    }
}

/// Spawn the recognition worker for one session.
pub fn start_recognizer(
    recorder: Arc<Mutex<Recorder>>,
    transcriber: Arc<dyn SpeechToText>,
    cfg: CaptionPipelineConfig,
    meter: Option<LiveMeter>,
) -> Recognizer {
    let (tx, rx) = unbounded();
    let paused = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));
    let paused_clone = paused.clone();
    let stop_clone = stop.clone();

    let handle = thread::spawn(move || {
        run_live_session(
            recorder,
            transcriber.as_ref(),
            &cfg,
            meter,
            &paused_clone,
            &stop_clone,
            &tx,
        );
    });

    Recognizer {
        events: rx,
        paused,
        stop,
        handle: Some(handle),
    }
}

/// One frame pulled from a source, or the reasons there was none.
pub(crate) enum FrameRead {
    Frame(Vec<f32>),
    Timeout,
    Closed,
}

/// Seam between the session driver and the microphone so tests can feed
/// scripted frames.
pub(crate) trait FrameSource {
    fn next_frame(&mut self, timeout: Duration) -> FrameRead;
    fn on_pause(&mut self) {}
    fn on_resume(&mut self) {}
    fn dropped_frames(&self) -> usize {
        0
    }
}

/// Live microphone source: device-rate frames converted to the target rate.
struct LiveFrames {
    stream: FrameStream,
    target_rate: u32,
    target_frame_samples: usize,
}

impl FrameSource for LiveFrames {
    fn next_frame(&mut self, timeout: Duration) -> FrameRead {
        match self.stream.frames.recv_timeout(timeout) {
            Ok(frame) => FrameRead::Frame(audio::convert_frame_to_target(
                frame,
                self.stream.device_rate,
                self.target_rate,
                self.target_frame_samples,
            )),
            Err(RecvTimeoutError::Timeout) => FrameRead::Timeout,
            Err(RecvTimeoutError::Disconnected) => FrameRead::Closed,
        }
    }

    fn on_pause(&mut self) {
        if let Err(err) = self.stream.pause() {
            log_debug(&format!("failed to pause capture stream: {err:#}"));
        }
        // Flush anything captured before the mute took effect.
        while self.stream.frames.try_recv().is_ok() {}
    }

    fn on_resume(&mut self) {
        if let Err(err) = self.stream.play() {
            log_debug(&format!("failed to resume capture stream: {err:#}"));
        }
    }

    fn dropped_frames(&self) -> usize {
        self.stream.dropped_frames()
    }
}

fn run_live_session(
    recorder: Arc<Mutex<Recorder>>,
    transcriber: &dyn SpeechToText,
    cfg: &CaptionPipelineConfig,
    meter: Option<LiveMeter>,
    paused: &AtomicBool,
    stop: &AtomicBool,
    events: &Sender<SpeechEvent>,
) {
    let vad_cfg = VadConfig::from(cfg);
    let stream = {
        let guard = match recorder.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.open_frame_stream(vad_cfg.frame_ms, vad_cfg.channel_capacity) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = events.send(SpeechEvent::Error(format!("{err:#}")));
                let _ = events.send(SpeechEvent::Ended {
                    reason: SessionEnd::Stopped,
                });
                return;
            }
        }
    };
    let target_frame_samples =
        ((u64::from(vad_cfg.sample_rate) * vad_cfg.frame_ms) / 1000).max(1) as usize;
    let mut source = LiveFrames {
        stream,
        target_rate: vad_cfg.sample_rate,
        target_frame_samples,
    };

    run_session(
        &mut source,
        transcriber,
        cfg,
        &vad_cfg,
        Duration::from_secs(cfg.session_secs),
        meter,
        paused,
        stop,
        events,
    );
    log_debug(&format!(
        "recognition session finished (dropped {} frames)",
        source.dropped_frames()
    ));
    tracing::info!(
        event = "recognition_session_finished",
        dropped_frames = source.dropped_frames()
    );
}

/// Drive one recognition session against an arbitrary frame source.
///
/// Emits `Started`, zero or more `Result` events, and exactly one `Ended`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_session(
    source: &mut dyn FrameSource,
    transcriber: &dyn SpeechToText,
    cfg: &CaptionPipelineConfig,
    vad_cfg: &VadConfig,
    session_budget: Duration,
    meter: Option<LiveMeter>,
    paused: &AtomicBool,
    stop: &AtomicBool,
    events: &Sender<SpeechEvent>,
) {
    let _ = events.send(SpeechEvent::Started);
    let session_deadline = Instant::now() + session_budget;
    let frame_wait = Duration::from_millis(vad_cfg.frame_ms);
    let mut index = 0usize;
    let mut was_paused = false;

    'session: loop {
        if stop.load(Ordering::Relaxed) {
            let _ = events.send(SpeechEvent::Ended {
                reason: SessionEnd::Stopped,
            });
            break 'session;
        }
        if paused.load(Ordering::Relaxed) {
            if !was_paused {
                source.on_pause();
                was_paused = true;
            }
            thread::sleep(Duration::from_millis(25));
            continue 'session;
        }
        if was_paused {
            source.on_resume();
            was_paused = false;
        }
        if Instant::now() >= session_deadline {
            let _ = events.send(SpeechEvent::Ended {
                reason: SessionEnd::Expired,
            });
            break 'session;
        }

        // Build one utterance.
        let mut vad = SimpleThresholdVad::new(vad_cfg.silence_threshold_db);
        let mut smoother = VadSmoother::new(vad_cfg.smoothing_frames);
        let mut accumulator = UtteranceAccumulator::from_config(vad_cfg);
        let mut state = UtteranceState::new(vad_cfg, vad_cfg.frame_ms);
        let mut last_interim_ms = 0u64;
        let mut interim_text = String::new();

        let cut = 'utterance: loop {
            if stop.load(Ordering::Relaxed) || paused.load(Ordering::Relaxed) {
                break 'utterance UtteranceCut::Interrupted;
            }
            if Instant::now() >= session_deadline {
                break 'utterance UtteranceCut::SessionEnd;
            }
            match source.next_frame(frame_wait) {
                FrameRead::Frame(frame) => {
                    if frame.is_empty() {
                        continue 'utterance;
                    }
                    if let Some(ref meter) = meter {
                        meter.set_db(audio::rms_db(&frame));
                    }
                    let decision = vad.process_frame(&frame);
                    let label = smoother.smooth(FrameLabel::from(decision));
                    accumulator.push_frame(frame, label);
                    if let Some(cut) = state.on_frame(label) {
                        break 'utterance cut;
                    }

                    // Interim pass: transcribe what we have so far on a cadence
                    // measured in audio time, so quiet gaps don't trigger it.
                    if state.speech_ms() >= vad_cfg.min_speech_ms
                        && state.total_ms().saturating_sub(last_interim_ms) >= cfg.interim_ms
                    {
                        last_interim_ms = state.total_ms();
                        let snapshot = accumulator.audio_snapshot();
                        match transcriber.transcribe(&snapshot, &cfg.lang) {
                            Ok(text) => {
                                let text = text.trim();
                                if !text.is_empty() && text != interim_text {
                                    interim_text = text.to_string();
                                    log_debug_content(&format!("interim transcript: {text}"));
                                    let _ = events.send(SpeechEvent::Result {
                                        index,
                                        text: text.to_string(),
                                        is_final: false,
                                    });
                                }
                            }
                            Err(err) => {
                                log_debug(&format!("interim transcription failed: {err:#}"));
                            }
                        }
                    }
                }
                FrameRead::Timeout => {
                    if let Some(cut) = state.on_timeout() {
                        break 'utterance cut;
                    }
                }
                FrameRead::Closed => {
                    break 'utterance UtteranceCut::Error("audio stream disconnected".to_string());
                }
            }
        };

        match cut {
            UtteranceCut::Interrupted => {
                // Muted or stopped mid-utterance; drop the partial audio.
                continue 'session;
            }
            UtteranceCut::Error(message) => {
                let _ = events.send(SpeechEvent::Error(message));
                let _ = events.send(SpeechEvent::Ended {
                    reason: SessionEnd::Expired,
                });
                break 'session;
            }
            UtteranceCut::Silence { .. } | UtteranceCut::MaxDuration | UtteranceCut::SessionEnd => {
                let session_over = matches!(cut, UtteranceCut::SessionEnd);
                log_debug(&format!(
                    "utterance closed ({}) after {}ms ({}ms speech)",
                    cut.label(),
                    state.total_ms(),
                    state.speech_ms()
                ));
                if state.speech_ms() >= vad_cfg.min_speech_ms && !accumulator.is_empty() {
                    let audio = accumulator.into_audio(&cut);
                    match transcriber.transcribe(&audio, &cfg.lang) {
                        Ok(text) => {
                            let text = text.trim();
                            if !text.is_empty() {
                                log_debug_content(&format!("final transcript: {text}"));
                                let _ = events.send(SpeechEvent::Result {
                                    index,
                                    text: text.to_string(),
                                    is_final: true,
                                });
                                index += 1;
                            }
                        }
                        Err(err) => {
                            // Transcription trouble is recoverable; report and
                            // keep the session alive for the next utterance.
                            let _ = events.send(SpeechEvent::Error(format!("{err:#}")));
                        }
                    }
                }
                if session_over {
                    let _ = events.send(SpeechEvent::Ended {
                        reason: SessionEnd::Expired,
                    });
                    break 'session;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptionPipelineConfig;
    use std::sync::atomic::AtomicUsize;

    fn test_cfg() -> (CaptionPipelineConfig, VadConfig) {
        let cfg = CaptionPipelineConfig {
            sample_rate: 16_000,
            max_utterance_ms: 2_000,
            silence_tail_ms: 200,
            min_speech_ms: 60,
            lookback_ms: 0,
            buffer_ms: 2_000,
            channel_capacity: 64,
            vad_threshold_db: -40.0,
            vad_frame_ms: 20,
            vad_smoothing_frames: 1,
            session_secs: 50,
            interim_ms: 400,
            lang: "en".to_string(),
        };
        let vad_cfg = VadConfig::from(&cfg);
        (cfg, vad_cfg)
    }

    struct ScriptedFrames {
        frames: Vec<FrameRead>,
    }

    impl ScriptedFrames {
        fn new(mut frames: Vec<FrameRead>) -> Self {
            frames.reverse();
            Self { frames }
        }
    }

    impl FrameSource for ScriptedFrames {
        fn next_frame(&mut self, _timeout: Duration) -> FrameRead {
            // An exhausted script hangs up the source so sessions finish
            // promptly instead of idling out their wall-clock budget.
            self.frames.pop().unwrap_or(FrameRead::Closed)
        }
    }

    struct MockStt {
        text: String,
        calls: AtomicUsize,
    }

    impl MockStt {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl SpeechToText for MockStt {
        fn transcribe(&self, _samples: &[f32], _lang: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.text.clone())
        }
    }

    fn loud(frames: usize, len: usize) -> Vec<FrameRead> {
        (0..frames)
            .map(|_| FrameRead::Frame(vec![0.5; len]))
            .collect()
    }

    fn quiet(frames: usize, len: usize) -> Vec<FrameRead> {
        (0..frames)
            .map(|_| FrameRead::Frame(vec![0.0005; len]))
            .collect()
    }

    fn drain(events: Receiver<SpeechEvent>) -> Vec<SpeechEvent> {
        let mut collected = Vec::new();
        while let Ok(event) = events.try_recv() {
            collected.push(event);
        }
        collected
    }

    #[test]
    fn speech_then_silence_produces_a_final_transcript() {
        let (cfg, vad_cfg) = test_cfg();
        let mut script = loud(10, 320);
        script.extend(quiet(15, 320));
        let mut source = ScriptedFrames::new(script);
        let stt = MockStt::new("hello there");
        let (tx, rx) = unbounded();
        let paused = AtomicBool::new(false);
        let stop = AtomicBool::new(false);

        run_session(
            &mut source,
            &stt,
            &cfg,
            &vad_cfg,
            Duration::from_secs(5),
            None,
            &paused,
            &stop,
            &tx,
        );

        let events = drain(rx);
        assert_eq!(events.first(), Some(&SpeechEvent::Started));
        assert!(events.contains(&SpeechEvent::Result {
            index: 0,
            text: "hello there".to_string(),
            is_final: true,
        }));
        assert!(stt.call_count() >= 1);
    }

    #[test]
    fn long_speech_emits_interim_before_final() {
        let (cfg, vad_cfg) = test_cfg();
        // 30 loud frames = 600ms of speech, enough for one interim pass at
        // the 400ms cadence before silence finalizes the utterance.
        let mut script = loud(30, 320);
        script.extend(quiet(15, 320));
        let mut source = ScriptedFrames::new(script);
        let stt = MockStt::new("still talking");
        let (tx, rx) = unbounded();
        let paused = AtomicBool::new(false);
        let stop = AtomicBool::new(false);

        run_session(
            &mut source,
            &stt,
            &cfg,
            &vad_cfg,
            Duration::from_secs(5),
            None,
            &paused,
            &stop,
            &tx,
        );

        let events = drain(rx);
        let interim_pos = events.iter().position(|event| {
            matches!(event, SpeechEvent::Result { is_final: false, .. })
        });
        let final_pos = events.iter().position(|event| {
            matches!(event, SpeechEvent::Result { is_final: true, .. })
        });
        let interim_pos = interim_pos.expect("expected an interim result");
        let final_pos = final_pos.expect("expected a final result");
        assert!(interim_pos < final_pos);
    }

    #[test]
    fn repeated_interim_text_is_not_re_emitted() {
        let (cfg, vad_cfg) = test_cfg();
        // Two interim windows pass with identical mock output; only the first
        // should be emitted.
        let mut script = loud(50, 320);
        script.extend(quiet(15, 320));
        let mut source = ScriptedFrames::new(script);
        let stt = MockStt::new("same words");
        let (tx, rx) = unbounded();
        let paused = AtomicBool::new(false);
        let stop = AtomicBool::new(false);

        run_session(
            &mut source,
            &stt,
            &cfg,
            &vad_cfg,
            Duration::from_secs(5),
            None,
            &paused,
            &stop,
            &tx,
        );

        let interim_count = drain(rx)
            .iter()
            .filter(|event| matches!(event, SpeechEvent::Result { is_final: false, .. }))
            .count();
        assert_eq!(interim_count, 1);
    }

    #[test]
    fn quiet_input_produces_no_results() {
        let (cfg, vad_cfg) = test_cfg();
        let mut script = quiet(20, 320);
        script.push(FrameRead::Closed);
        let mut source = ScriptedFrames::new(script);
        let stt = MockStt::new("should not appear");
        let (tx, rx) = unbounded();
        let paused = AtomicBool::new(false);
        let stop = AtomicBool::new(false);

        run_session(
            &mut source,
            &stt,
            &cfg,
            &vad_cfg,
            Duration::from_secs(5),
            None,
            &paused,
            &stop,
            &tx,
        );

        let events = drain(rx);
        assert!(!events
            .iter()
            .any(|event| matches!(event, SpeechEvent::Result { .. })));
        assert_eq!(stt.call_count(), 0);
    }

    #[test]
    fn expired_budget_ends_the_session() {
        let (cfg, vad_cfg) = test_cfg();
        let mut source = ScriptedFrames::new(Vec::new());
        let stt = MockStt::new("");
        let (tx, rx) = unbounded();
        let paused = AtomicBool::new(false);
        let stop = AtomicBool::new(false);

        run_session(
            &mut source,
            &stt,
            &cfg,
            &vad_cfg,
            Duration::ZERO,
            None,
            &paused,
            &stop,
            &tx,
        );

        let events = drain(rx);
        assert_eq!(
            events.last(),
            Some(&SpeechEvent::Ended {
                reason: SessionEnd::Expired,
            })
        );
    }

    #[test]
    fn stop_flag_ends_the_session_without_results() {
        let (cfg, vad_cfg) = test_cfg();
        let mut source = ScriptedFrames::new(loud(5, 320));
        let stt = MockStt::new("cut off");
        let (tx, rx) = unbounded();
        let paused = AtomicBool::new(false);
        let stop = AtomicBool::new(true);

        run_session(
            &mut source,
            &stt,
            &cfg,
            &vad_cfg,
            Duration::from_secs(5),
            None,
            &paused,
            &stop,
            &tx,
        );

        let events = drain(rx);
        assert_eq!(
            events.last(),
            Some(&SpeechEvent::Ended {
                reason: SessionEnd::Stopped,
            })
        );
        assert!(!events
            .iter()
            .any(|event| matches!(event, SpeechEvent::Result { .. })));
    }

    #[test]
    fn disconnected_source_reports_error_then_ends() {
        let (cfg, vad_cfg) = test_cfg();
        let mut source = ScriptedFrames::new(vec![FrameRead::Closed]);
        let stt = MockStt::new("");
        let (tx, rx) = unbounded();
        let paused = AtomicBool::new(false);
        let stop = AtomicBool::new(false);

        run_session(
            &mut source,
            &stt,
            &cfg,
            &vad_cfg,
            Duration::from_secs(5),
            None,
            &paused,
            &stop,
            &tx,
        );

        let events = drain(rx);
        assert!(events
            .iter()
            .any(|event| matches!(event, SpeechEvent::Error(_))));
        assert_eq!(
            events.last(),
            Some(&SpeechEvent::Ended {
                reason: SessionEnd::Expired,
            })
        );
    }
}
