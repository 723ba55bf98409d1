//! Audio capture via cpal backend, plus the PCM sample codec.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block, perform I/O, or allocate after its first invocation.
//! Frames are folded to interleaved `[left, right]` f32 pairs and written
//! straight into the SPSC ring producer, whose `push_slice` is lock-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread; the
//! engine opens it inside the encoder worker.

pub mod pcm;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::{
    buffering::CaptureProducer,
    error::{Result, WavGateError},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Fold interleaved device samples with `channels` channels into
/// interleaved stereo. Mono is duplicated to both sides; channels past the
/// second are ignored.
pub fn fold_to_stereo<T: Copy>(
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> f32,
    out: &mut Vec<f32>,
) {
    out.clear();
    if channels == 0 {
        return;
    }
    for frame in data.chunks_exact(channels) {
        let left = convert(frame[0]);
        let right = if channels == 1 { left } else { convert(frame[1]) };
        out.push(left);
        out.push(right);
    }
}

/// Handle to an active audio capture stream.
///
/// **Not `Send`**: create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Cleared to make the callback no-op.
    running: Arc<AtomicBool>,
    /// Set by the stream error callback.
    failed: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: CaptureProducer,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if selected_device.is_none() {
                        warn!("preferred input device '{preferred_name}' not found, falling back");
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| WavGateError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(WavGateError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| WavGateError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));
        let ch = channels as usize;

        macro_rules! input_stream {
            ($sample:ty, $convert:expr) => {{
                let running = Arc::clone(&running);
                let failed = Arc::clone(&failed);
                let mut stereo: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[$sample], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        fold_to_stereo(data, ch, $convert, &mut stereo);
                        let written = producer.push_slice(&stereo);
                        if written < stereo.len() {
                            warn!(
                                "capture ring full: dropped {} samples",
                                stereo.len() - written
                            );
                        }
                    },
                    move |err| {
                        error!("audio stream error: {err}");
                        failed.store(true, Ordering::Release);
                    },
                    None,
                )
            }};
        }

        let stream = match supported.sample_format() {
            SampleFormat::F32 => input_stream!(f32, |s: f32| s),
            SampleFormat::I16 => input_stream!(i16, |s: i16| s as f32 / 32768.0),
            SampleFormat::U8 => input_stream!(u8, |s: u8| (s as f32 - 128.0) / 128.0),
            fmt => {
                return Err(WavGateError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| WavGateError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| WavGateError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            failed,
            sample_rate,
        })
    }

    /// Whether the stream error callback fired.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: CaptureProducer,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(WavGateError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
