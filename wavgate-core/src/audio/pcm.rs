//! Float-to-PCM conversion.
//!
//! Stereo `[f64; 2]` frames are written interleaved at 1, 2 or 3 bytes per
//! sample. One-byte precision is unsigned (silence = 127); two and three
//! bytes are signed little-endian two's complement.
//!
//! Channel mapping:
//! - 1 channel: the average of left and right.
//! - 2 channels: left, right.
//! - more: left, right, then zeros for every extra channel.

use serde::{Deserialize, Serialize};

use crate::buffering::block::Frame;
use crate::error::{Result, WavGateError};

/// Output PCM layout of a WAV stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    /// Frames per second (Hz).
    pub sample_rate: u32,
    /// Interleaved channel count, `>= 1`.
    pub channels: u16,
    /// Bytes per sample: 1, 2 or 3.
    pub precision: u16,
}

impl Format {
    /// Build a validated format.
    ///
    /// # Errors
    /// `WavGateError::InvalidFormat` for zero channels, an unsupported
    /// precision, or a layout whose block align or byte rate does not fit
    /// the header fields.
    pub fn new(sample_rate: u32, channels: u16, precision: u16) -> Result<Self> {
        let format = Self {
            sample_rate,
            channels,
            precision,
        };
        format.validate()?;
        Ok(format)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels < 1 {
            return Err(WavGateError::InvalidFormat(
                "invalid number of channels (less than 1)".into(),
            ));
        }
        if !matches!(self.precision, 1..=3) {
            return Err(WavGateError::InvalidFormat(format!(
                "unsupported precision {}, 1, 2 or 3 is supported",
                self.precision
            )));
        }
        let block_align = self.channels.checked_mul(self.precision).ok_or_else(|| {
            WavGateError::InvalidFormat(format!(
                "{} channels at {} bytes per sample overflow the block align",
                self.channels, self.precision
            ))
        })?;
        if self.sample_rate.checked_mul(u32::from(block_align)).is_none() {
            return Err(WavGateError::InvalidFormat(format!(
                "byte rate of {} Hz x {block_align} bytes overflows 32 bits",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Bytes per interleaved frame (block align).
    pub fn width(&self) -> usize {
        self.channels as usize * self.precision as usize
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.precision * 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.width() as u32
    }

    /// Append the PCM encoding of `frames` to `out`.
    pub fn encode_frames(&self, frames: &[Frame], out: &mut Vec<u8>) {
        out.reserve(frames.len() * self.width());
        for frame in frames {
            self.encode_frame(*frame, out);
        }
    }

    fn encode_frame(&self, frame: Frame, out: &mut Vec<u8>) {
        if self.channels == 1 {
            self.encode_sample((frame[0] + frame[1]) / 2.0, out);
            return;
        }
        for sample in frame {
            self.encode_sample(sample, out);
        }
        for _ in 2..self.channels {
            self.encode_sample(0.0, out);
        }
    }

    fn encode_sample(&self, x: f64, out: &mut Vec<u8>) {
        let x = x.clamp(-1.0, 1.0);
        let precision = self.precision as usize;
        let bits = (precision * 8) as i32;
        let raw: u64 = if precision == 1 {
            ((x + 1.0) / 2.0 * (2f64.powi(bits) - 1.0)) as u64
        } else if x < 0.0 {
            let magnitude = (-x * 2f64.powi(bits - 1)) as i64;
            (-magnitude) as u64
        } else {
            (x * (2f64.powi(bits - 1) - 1.0)) as u64
        };
        out.extend_from_slice(&raw.to_le_bytes()[..precision]);
    }
}
