//! Default values and validation tables for the CLI configuration.

pub const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:9377";
pub const DEFAULT_TRANSLATE_ENDPOINT: &str = "https://api.mymemory.translated.net/get";

pub const DEFAULT_TRANSLATE_TIMEOUT_MS: u64 = 8_000;
pub const MIN_TRANSLATE_TIMEOUT_MS: u64 = 500;
pub const MAX_TRANSLATE_TIMEOUT_MS: u64 = 60_000;

/// How long one continuous recognition session may run before the engine ends
/// it and the caption pipeline restarts it (browsers do the same to
/// continuous recognition, so peers built on either behave alike).
pub const DEFAULT_CAPTION_SESSION_SECS: u64 = 50;
pub const MIN_CAPTION_SESSION_SECS: u64 = 10;
pub const MAX_CAPTION_SESSION_SECS: u64 = 300;

/// Cadence for interim transcriptions of the in-progress utterance.
pub const DEFAULT_CAPTION_INTERIM_MS: u64 = 1_200;
pub const MIN_CAPTION_INTERIM_MS: u64 = 300;
pub const MAX_CAPTION_INTERIM_MS: u64 = 5_000;

pub const DEFAULT_VOICE_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_VOICE_MAX_UTTERANCE_MS: u64 = 10_000;
pub const DEFAULT_VOICE_SILENCE_TAIL_MS: u64 = 600;
pub const DEFAULT_VOICE_MIN_SPEECH_MS: u64 = 300;
pub const DEFAULT_VOICE_LOOKBACK_MS: u64 = 500;
pub const DEFAULT_VOICE_BUFFER_MS: u64 = 12_000;
pub const DEFAULT_VOICE_CHANNEL_CAPACITY: usize = 128;
pub const DEFAULT_VOICE_VAD_THRESHOLD_DB: f32 = -45.0;
pub const DEFAULT_VOICE_VAD_FRAME_MS: u64 = 20;
pub const DEFAULT_VOICE_VAD_SMOOTHING_FRAMES: usize = 3;
pub const MAX_UTTERANCE_HARD_LIMIT_MS: u64 = 30_000;

pub const ISO_639_1_CODES: &[&str] = &[
    "af", "am", "ar", "az", "be", "bg", "bn", "bs", "ca", "cs", "cy", "da", "de", "el", "en", "es",
    "et", "eu", "fa", "fi", "fil", "fr", "ga", "gl", "gu", "he", "hi", "hr", "hu", "hy", "id",
    "is", "it", "ja", "jv", "ka", "kk", "km", "kn", "ko", "lo", "lt", "lv", "mk", "ml", "mn", "mr",
    "ms", "my", "ne", "nl", "no", "pa", "pl", "pt", "ro", "ru", "si", "sk", "sl", "sq", "sr", "sv",
    "sw", "ta", "te", "th", "tr", "uk", "ur", "vi", "zh",
];
