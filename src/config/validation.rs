use super::defaults::{
    ISO_639_1_CODES, MAX_CAPTION_INTERIM_MS, MAX_CAPTION_SESSION_SECS, MAX_TRANSLATE_TIMEOUT_MS,
    MAX_UTTERANCE_HARD_LIMIT_MS, MIN_CAPTION_INTERIM_MS, MIN_CAPTION_SESSION_SECS,
    MIN_TRANSLATE_TIMEOUT_MS,
};
use super::AppConfig;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::Path;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        validate_broker_addr(&self.broker)?;

        if !self.translate_endpoint.starts_with("http://")
            && !self.translate_endpoint.starts_with("https://")
        {
            bail!(
                "--translate-endpoint must be an http(s) URL, got '{}'",
                self.translate_endpoint
            );
        }
        if !(MIN_TRANSLATE_TIMEOUT_MS..=MAX_TRANSLATE_TIMEOUT_MS)
            .contains(&self.translate_timeout_ms)
        {
            bail!(
                "--translate-timeout-ms must be between {MIN_TRANSLATE_TIMEOUT_MS} and {MAX_TRANSLATE_TIMEOUT_MS}, got {}",
                self.translate_timeout_ms
            );
        }
        if !(MIN_CAPTION_SESSION_SECS..=MAX_CAPTION_SESSION_SECS)
            .contains(&self.caption_session_secs)
        {
            bail!(
                "--caption-session-secs must be between {MIN_CAPTION_SESSION_SECS} and {MAX_CAPTION_SESSION_SECS}, got {}",
                self.caption_session_secs
            );
        }
        if !(MIN_CAPTION_INTERIM_MS..=MAX_CAPTION_INTERIM_MS).contains(&self.caption_interim_ms) {
            bail!(
                "--caption-interim-ms must be between {MIN_CAPTION_INTERIM_MS} and {MAX_CAPTION_INTERIM_MS}, got {}",
                self.caption_interim_ms
            );
        }

        if !(8_000..=96_000).contains(&self.voice_sample_rate) {
            bail!(
                "--voice-sample-rate must be between 8000 and 96000 Hz, got {}",
                self.voice_sample_rate
            );
        }
        if self.voice_max_utterance_ms == 0
            || self.voice_max_utterance_ms > MAX_UTTERANCE_HARD_LIMIT_MS
        {
            bail!(
                "--voice-max-utterance-ms must be between 1 and {MAX_UTTERANCE_HARD_LIMIT_MS} ms, got {}",
                self.voice_max_utterance_ms
            );
        }
        if self.voice_silence_tail_ms < 200
            || self.voice_silence_tail_ms > self.voice_max_utterance_ms
        {
            bail!(
                "--voice-silence-tail-ms must be >=200 and <= --voice-max-utterance-ms ({})",
                self.voice_max_utterance_ms
            );
        }
        if self.voice_min_speech_ms < 50 || self.voice_min_speech_ms > self.voice_max_utterance_ms {
            bail!(
                "--voice-min-speech-ms must be between 50 and {}",
                self.voice_max_utterance_ms
            );
        }
        if self.voice_lookback_ms > self.voice_max_utterance_ms {
            bail!(
                "--voice-lookback-ms ({}) cannot exceed --voice-max-utterance-ms ({})",
                self.voice_lookback_ms,
                self.voice_max_utterance_ms
            );
        }
        if self.voice_buffer_ms < self.voice_max_utterance_ms || self.voice_buffer_ms > 120_000 {
            bail!(
                "--voice-buffer-ms must be between {} and 120000 (ms)",
                self.voice_max_utterance_ms
            );
        }
        if !(8..=1024).contains(&self.voice_channel_capacity) {
            bail!(
                "--voice-channel-capacity must be between 8 and 1024, got {}",
                self.voice_channel_capacity
            );
        }
        if !(-120.0..=0.0).contains(&self.voice_vad_threshold_db) {
            bail!(
                "--voice-vad-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.voice_vad_threshold_db
            );
        }
        if !(5..=120).contains(&self.voice_vad_frame_ms) {
            bail!(
                "--voice-vad-frame-ms must be between 5 and 120, got {}",
                self.voice_vad_frame_ms
            );
        }
        if !(1..=10).contains(&self.voice_vad_smoothing_frames) {
            bail!(
                "--voice-vad-smoothing-frames must be between 1 and 10, got {}",
                self.voice_vad_smoothing_frames
            );
        }

        // The interim pass must fit comfortably inside one utterance window.
        if self.caption_interim_ms >= self.voice_max_utterance_ms {
            bail!(
                "--caption-interim-ms ({}) must be smaller than --voice-max-utterance-ms ({})",
                self.caption_interim_ms,
                self.voice_max_utterance_ms
            );
        }

        // If a model path was supplied, make sure it exists and store it canonical.
        if let Some(model) = &mut self.whisper_model_path {
            let model_path = Path::new(model);
            if !model_path.exists() {
                bail!(
                    "whisper model path '{}' does not exist",
                    model_path.display()
                );
            }
            let canonical = model_path
                .canonicalize()
                .with_context(|| format!("failed to canonicalize whisper model path '{model}'"))?;
            *model = canonical
                .to_str()
                .map(|s| s.to_string())
                .ok_or_else(|| anyhow!("whisper model path must be valid UTF-8"))?;
        }

        if self.lang.trim().is_empty()
            || !self
                .lang
                .chars()
                .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
        {
            bail!("--lang must contain only alphabetic characters or '-'/'_' separators");
        }
        // Allow locale-style values but only check the leading ISO-639-1 code.
        let lang_primary = self
            .lang
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if !ISO_639_1_CODES.contains(&lang_primary.as_str()) {
            bail!(
                "--lang must start with a valid ISO-639-1 code, got '{}'",
                self.lang
            );
        }

        Ok(())
    }
}

/// Broker addresses are `host:port`; anything else fails fast instead of at
/// connect time with an opaque socket error.
fn validate_broker_addr(addr: &str) -> Result<()> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        bail!("--broker cannot be empty");
    }
    let Some((host, port)) = trimmed.rsplit_once(':') else {
        bail!("--broker must be host:port, got '{addr}'");
    };
    if host.is_empty() {
        bail!("--broker host cannot be empty");
    }
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow!("--broker port must be a number in 1-65535, got '{port}'"))?;
    if port == 0 {
        bail!("--broker port cannot be 0");
    }
    Ok(())
}
