//! Microphone source: cpal capture drained from the SPSC ring.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::SampleSource;
use crate::{
    audio::AudioCapture,
    buffering::{block::Frame, create_capture_ring, CaptureConsumer, Consumer, Observer},
    error::{Result, WavGateError},
};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A live device that stays silent this long is treated as lost.
const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Blocks until a full block of captured audio is available.
///
/// **Not `Send`**: open it on the thread that will pull from it.
pub struct CaptureSource {
    capture: AudioCapture,
    consumer: CaptureConsumer,
    interleaved: Vec<f32>,
    stall_timeout: Duration,
}

impl CaptureSource {
    /// Open the preferred input device (or the default one).
    pub fn open(preferred_device_name: Option<&str>) -> Result<Self> {
        let (producer, consumer) = create_capture_ring();
        let capture = AudioCapture::open_with_preference(producer, preferred_device_name)?;
        Ok(Self {
            capture,
            consumer,
            interleaved: Vec::new(),
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        })
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

impl SampleSource for CaptureSource {
    fn pull(&mut self, block: &mut [Frame]) -> Result<Option<usize>> {
        let needed = block.len() * 2;
        let mut waited = Duration::ZERO;
        while self.consumer.occupied_len() < needed {
            if self.capture.has_failed() {
                return Err(WavGateError::AudioStream("input stream failed".into()));
            }
            if waited >= self.stall_timeout {
                warn!(waited_ms = waited.as_millis() as u64, "input device stalled");
                return Err(WavGateError::AudioStream(format!(
                    "no audio from input device for {} ms",
                    waited.as_millis()
                )));
            }
            thread::sleep(POLL_INTERVAL);
            waited += POLL_INTERVAL;
        }

        self.interleaved.resize(needed, 0.0);
        let popped = self.consumer.pop_slice(&mut self.interleaved);
        let frames = popped / 2;
        for (frame, pair) in block
            .iter_mut()
            .zip(self.interleaved[..frames * 2].chunks_exact(2))
        {
            *frame = [f64::from(pair[0]), f64::from(pair[1])];
        }
        if waited > Duration::ZERO {
            debug!(waited_ms = waited.as_millis() as u64, frames, "capture block ready");
        }
        Ok(Some(frames))
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.capture.sample_rate)
    }
}
