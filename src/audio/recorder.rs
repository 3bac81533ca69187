//! System microphone capture via CPAL.
//!
//! Handles device enumeration and opens a continuous frame stream: the device
//! callback downmixes to mono and re-chunks into fixed frames which the
//! recognizer worker drains from a bounded channel. Resampling to 16 kHz
//! happens on the consumer side, per frame.

use super::dispatch::FrameDispatcher;
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

/// A live capture stream delivering fixed-size device-rate frames.
///
/// Owns the CPAL stream, so it must stay on the thread that created it and be
/// dropped (or paused) to release the microphone.
pub struct FrameStream {
    stream: cpal::Stream,
    pub frames: Receiver<Vec<f32>>,
    pub dropped: Arc<AtomicUsize>,
    pub device_rate: u32,
    pub device_frame_samples: usize,
}

impl FrameStream {
    pub fn play(&self) -> Result<()> {
        self.stream.play().context("failed to start audio stream")
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause().context("failed to pause audio stream")
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Recorder {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Create a recorder, optionally forcing a specific device so users can
    /// pick the right microphone when a laptop exposes multiple inputs.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self { device })
    }

    /// Get the name of the active recording device.
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Open a continuous capture stream chunked into `frame_ms` frames.
    ///
    /// The stream starts playing immediately. Frames are device-rate mono;
    /// callers convert to the target rate per frame.
    pub fn open_frame_stream(&self, frame_ms: u64, capacity: usize) -> Result<FrameStream> {
        let default_config = self
            .device
            .default_input_config()
            .context("failed to query input device config")?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));
        let frame_ms = frame_ms.clamp(5, 120);
        let device_frame_samples = ((u64::from(device_rate) * frame_ms) / 1000).max(1) as usize;

        log_debug(&format!(
            "capture config: format={format:?} sample_rate={device_rate}Hz channels={channels} frame={frame_ms}ms"
        ));

        let (sender, receiver) = bounded::<Vec<f32>>(capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            device_frame_samples,
            sender,
            dropped.clone(),
        )));

        // Keep the error callback quiet in the UI and mirror issues into the log.
        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));

        let stream = match format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample as f32 / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play().with_context(|| {
            format!(
                "failed to start capture on '{}'; {}",
                self.device_name(),
                mic_permission_hint()
            )
        })?;

        Ok(FrameStream {
            stream,
            frames: receiver,
            dropped,
            device_rate,
            device_frame_samples,
        })
    }
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
