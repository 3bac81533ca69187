//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::Parser;

use crate::lang::TargetLang;
pub use defaults::{
    DEFAULT_BROKER_ADDR, DEFAULT_CAPTION_INTERIM_MS, DEFAULT_CAPTION_SESSION_SECS,
    DEFAULT_TRANSLATE_ENDPOINT, DEFAULT_TRANSLATE_TIMEOUT_MS, DEFAULT_VOICE_BUFFER_MS,
    DEFAULT_VOICE_CHANNEL_CAPACITY, DEFAULT_VOICE_LOOKBACK_MS, DEFAULT_VOICE_MAX_UTTERANCE_MS,
    DEFAULT_VOICE_MIN_SPEECH_MS, DEFAULT_VOICE_SAMPLE_RATE, DEFAULT_VOICE_SILENCE_TAIL_MS,
    DEFAULT_VOICE_VAD_FRAME_MS, DEFAULT_VOICE_VAD_SMOOTHING_FRAMES,
    DEFAULT_VOICE_VAD_THRESHOLD_DB,
};

/// CLI options for the BabelCall TUI. Validated values keep the pipelines safe.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "BabelCall: two-party video calls with live translated captions",
    author,
    version
)]
pub struct AppConfig {
    /// Relay broker address (host:port)
    #[arg(long, env = "BABELCALL_BROKER", default_value = DEFAULT_BROKER_ADDR)]
    pub broker: String,

    /// Target language for incoming captions
    #[arg(long = "target-lang", value_enum, default_value_t = TargetLang::Spanish)]
    pub target_lang: TargetLang,

    /// Translation service endpoint
    #[arg(
        long = "translate-endpoint",
        env = "BABELCALL_TRANSLATE_ENDPOINT",
        default_value = DEFAULT_TRANSLATE_ENDPOINT
    )]
    pub translate_endpoint: String,

    /// Translation request timeout (milliseconds)
    #[arg(long = "translate-timeout-ms", default_value_t = DEFAULT_TRANSLATE_TIMEOUT_MS)]
    pub translate_timeout_ms: u64,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "BABELCALL_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "BABELCALL_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript/caption snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "BABELCALL_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Whisper model path (GGML format)
    #[arg(long, env = "BABELCALL_WHISPER_MODEL")]
    pub whisper_model_path: Option<String>,

    /// Spoken input language passed to Whisper
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Seconds a recognition session runs before it ends and restarts
    #[arg(long = "caption-session-secs", default_value_t = DEFAULT_CAPTION_SESSION_SECS)]
    pub caption_session_secs: u64,

    /// Interim transcription cadence while an utterance is in progress (milliseconds)
    #[arg(long = "caption-interim-ms", default_value_t = DEFAULT_CAPTION_INTERIM_MS)]
    pub caption_interim_ms: u64,

    /// Target sample rate for the caption pipeline (Hz)
    #[arg(long = "voice-sample-rate", default_value_t = DEFAULT_VOICE_SAMPLE_RATE)]
    pub voice_sample_rate: u32,

    /// Maximum utterance duration before a hard cut (milliseconds)
    #[arg(long = "voice-max-utterance-ms", default_value_t = DEFAULT_VOICE_MAX_UTTERANCE_MS)]
    pub voice_max_utterance_ms: u64,

    /// Trailing silence that finalizes an utterance (milliseconds)
    #[arg(long = "voice-silence-tail-ms", default_value_t = DEFAULT_VOICE_SILENCE_TAIL_MS)]
    pub voice_silence_tail_ms: u64,

    /// Minimum speech before a final transcript is produced (milliseconds)
    #[arg(long = "voice-min-speech-ms", default_value_t = DEFAULT_VOICE_MIN_SPEECH_MS)]
    pub voice_min_speech_ms: u64,

    /// Amount of trailing audio retained after a silence cut (milliseconds)
    #[arg(long = "voice-lookback-ms", default_value_t = DEFAULT_VOICE_LOOKBACK_MS)]
    pub voice_lookback_ms: u64,

    /// Total buffered audio budget per utterance (milliseconds)
    #[arg(long = "voice-buffer-ms", default_value_t = DEFAULT_VOICE_BUFFER_MS)]
    pub voice_buffer_ms: u64,

    /// Frame channel capacity between capture and the recognizer
    #[arg(
        long = "voice-channel-capacity",
        default_value_t = DEFAULT_VOICE_CHANNEL_CAPACITY
    )]
    pub voice_channel_capacity: usize,

    /// Voice activity detection threshold (decibels)
    #[arg(
        long = "voice-vad-threshold-db",
        default_value_t = DEFAULT_VOICE_VAD_THRESHOLD_DB
    )]
    pub voice_vad_threshold_db: f32,

    /// Voice activity detection frame size (milliseconds)
    #[arg(long = "voice-vad-frame-ms", default_value_t = DEFAULT_VOICE_VAD_FRAME_MS)]
    pub voice_vad_frame_ms: u64,

    /// VAD smoothing window (frames)
    #[arg(
        long = "voice-vad-smoothing-frames",
        default_value_t = DEFAULT_VOICE_VAD_SMOOTHING_FRAMES
    )]
    pub voice_vad_smoothing_frames: usize,
}

/// Tunable parameters for the capture + recognition side of the caption pipeline.
#[derive(Debug, Clone)]
pub struct CaptionPipelineConfig {
    pub sample_rate: u32,
    pub max_utterance_ms: u64,
    pub silence_tail_ms: u64,
    pub min_speech_ms: u64,
    pub lookback_ms: u64,
    pub buffer_ms: u64,
    pub channel_capacity: usize,
    pub vad_threshold_db: f32,
    pub vad_frame_ms: u64,
    pub vad_smoothing_frames: usize,
    pub session_secs: u64,
    pub interim_ms: u64,
    pub lang: String,
}

impl AppConfig {
    /// Snapshot the CLI-controlled recognition settings for the recognizer worker.
    pub fn caption_pipeline_config(&self) -> CaptionPipelineConfig {
        CaptionPipelineConfig {
            sample_rate: self.voice_sample_rate,
            max_utterance_ms: self.voice_max_utterance_ms,
            silence_tail_ms: self.voice_silence_tail_ms,
            min_speech_ms: self.voice_min_speech_ms,
            lookback_ms: self.voice_lookback_ms,
            buffer_ms: self.voice_buffer_ms,
            channel_capacity: self.voice_channel_capacity,
            vad_threshold_db: self.voice_vad_threshold_db,
            vad_frame_ms: self.voice_vad_frame_ms,
            vad_smoothing_frames: self.voice_vad_smoothing_frames,
            session_secs: self.caption_session_secs,
            interim_ms: self.caption_interim_ms,
            lang: self.lang.clone(),
        }
    }
}
