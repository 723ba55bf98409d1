//! The fixed 44-byte RIFF/WAVE header.
//!
//! ## Layout (all integers little-endian)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0  | 4 | `"RIFF"` |
//! | 4  | 4 | file size (`44 + data`, `-1` until finalized) |
//! | 8  | 4 | `"WAVE"` |
//! | 12 | 4 | `"fmt "` |
//! | 16 | 4 | format chunk size (16) |
//! | 20 | 2 | format type (1 = PCM) |
//! | 22 | 2 | channels |
//! | 24 | 4 | sample rate |
//! | 28 | 4 | byte rate |
//! | 32 | 2 | block align |
//! | 34 | 2 | bits per sample |
//! | 36 | 4 | `"data"` |
//! | 40 | 4 | data size (`-1` until finalized) |

use std::io::{self, Seek, SeekFrom, Write};

use crate::audio::pcm::Format;
use crate::error::{Result, WavGateError};

/// Serialized header length in bytes.
pub const HEADER_LEN: usize = 44;

/// Size-field value written before the payload length is known (`-1` as i32).
pub const PLACEHOLDER_SIZE: u32 = u32::MAX;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub file_size: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Header for `format` with both size fields left as placeholders.
    ///
    /// # Errors
    /// `WavGateError::InvalidFormat` if the format fails validation.
    pub fn build(format: &Format) -> Result<Self> {
        format.validate()?;
        Ok(Self {
            file_size: PLACEHOLDER_SIZE,
            channels: format.channels,
            sample_rate: format.sample_rate,
            byte_rate: format.byte_rate(),
            block_align: format.width() as u16,
            bits_per_sample: format.bits_per_sample(),
            data_size: PLACEHOLDER_SIZE,
        })
    }

    /// Copy of this header with the size fields set for `payload_len` bytes
    /// of PCM data.
    ///
    /// # Errors
    /// `WavGateError::EncodeWrite` when the payload cannot be described by
    /// the 32-bit size fields.
    pub fn finalized(&self, payload_len: usize) -> Result<Self> {
        let data_size = u32::try_from(payload_len)
            .ok()
            .filter(|&len| len < PLACEHOLDER_SIZE - HEADER_LEN as u32)
            .ok_or_else(|| {
                WavGateError::EncodeWrite(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("payload of {payload_len} bytes exceeds the WAV size limit"),
                ))
            })?;
        Ok(Self {
            file_size: HEADER_LEN as u32 + data_size,
            data_size,
            ..*self
        })
    }

    pub fn is_finalized(&self) -> bool {
        self.file_size != PLACEHOLDER_SIZE && self.data_size != PLACEHOLDER_SIZE
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.file_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
        out[22..24].copy_from_slice(&self.channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        out[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }

    /// Parse the first 44 bytes of `bytes`.
    ///
    /// # Errors
    /// `WavGateError::MalformedHeader` on a short buffer, a wrong marker or a
    /// non-PCM format chunk.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(WavGateError::MalformedHeader(format!(
                "need {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        for (at, mark) in [(0, b"RIFF"), (8, b"WAVE"), (12, b"fmt "), (36, b"data")] {
            if &bytes[at..at + 4] != mark {
                return Err(WavGateError::MalformedHeader(format!(
                    "expected {:?} at offset {at}",
                    String::from_utf8_lossy(mark)
                )));
            }
        }
        if u32_at(16) != FMT_CHUNK_LEN || u16_at(20) != FORMAT_PCM {
            return Err(WavGateError::MalformedHeader(
                "format chunk is not 16-byte PCM".into(),
            ));
        }
        Ok(Self {
            file_size: u32_at(4),
            channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_size: u32_at(40),
        })
    }

    /// Overwrite the header at the start of a seekable sink, then return the
    /// cursor to the end of the stream.
    pub fn write_at_start<W: Write + Seek>(&self, sink: &mut W) -> io::Result<()> {
        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&self.to_bytes())?;
        sink.seek(SeekFrom::End(0))?;
        Ok(())
    }
}
