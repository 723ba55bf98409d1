//! WAV file input decoded with `hound`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavIntoSamples, WavReader};
use tracing::info;
use wavgate_core::{Frame, SampleSource, WavGateError};

type Reader = BufReader<File>;

enum Samples {
    Int {
        iter: WavIntoSamples<Reader, i32>,
        scale: f64,
    },
    Float(WavIntoSamples<Reader, f32>),
}

impl Samples {
    fn next_sample(&mut self) -> wavgate_core::Result<Option<f64>> {
        let next = match self {
            Samples::Int { iter, scale } => iter.next().map(|s| s.map(|v| v as f64 * *scale)),
            Samples::Float(iter) => iter.next().map(|s| s.map(f64::from)),
        };
        next.transpose()
            .map_err(|e| WavGateError::Source(format!("WAV decode failed: {e}")))
    }
}

/// Streams a WAV file as stereo frames: mono is duplicated, channels past
/// the second are skipped.
pub struct WavFileSource {
    samples: Samples,
    channels: usize,
    sample_rate: u32,
}

impl WavFileSource {
    pub fn open(path: &Path) -> wavgate_core::Result<Self> {
        let reader = WavReader::open(path).map_err(|e| {
            WavGateError::Source(format!("failed to open {}: {e}", path.display()))
        })?;
        let spec = reader.spec();
        info!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            bits = spec.bits_per_sample,
            "streaming WAV input"
        );

        let samples = match spec.sample_format {
            SampleFormat::Int => Samples::Int {
                iter: reader.into_samples::<i32>(),
                scale: 1.0 / f64::from(1u32 << (spec.bits_per_sample.clamp(1, 32) - 1)),
            },
            SampleFormat::Float => Samples::Float(reader.into_samples::<f32>()),
        };
        Ok(Self {
            samples,
            channels: usize::from(spec.channels.max(1)),
            sample_rate: spec.sample_rate,
        })
    }
}

impl SampleSource for WavFileSource {
    fn pull(&mut self, block: &mut [Frame]) -> wavgate_core::Result<Option<usize>> {
        let mut n = 0;
        'frames: while n < block.len() {
            let mut frame = [0.0; 2];
            for channel in 0..self.channels {
                // A trailing partial frame is discarded.
                let Some(sample) = self.samples.next_sample()? else {
                    break 'frames;
                };
                if channel < 2 {
                    frame[channel] = sample;
                }
            }
            if self.channels == 1 {
                frame[1] = frame[0];
            }
            block[n] = frame;
            n += 1;
        }
        Ok((n > 0).then_some(n))
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }
}
