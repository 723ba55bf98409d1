//! Messages crossing the encoder worker boundary.
//!
//! | Direction | Type | Channel |
//! |-----------|------|---------|
//! | in  | `Control` | control mailbox (polled once per block) |
//! | out | `CompletedSegment` | completed segments |
//! | out | `String` | debug file names (debug files only) |
//! | out | `Vec<SampleBlock>` | debug sample blocks (debug samples only) |

use serde::{Deserialize, Serialize};

use crate::wav::header::{WavHeader, HEADER_LEN};

// ---------------------------------------------------------------------------
// Inbound control
// ---------------------------------------------------------------------------

/// Interrupts delivered to the encoder worker between blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    /// Deliver a snapshot of the in-progress segment and keep going.
    Ask,
    /// Deliver whatever the long-form buffer holds, then stop pulling.
    Stop,
}

// ---------------------------------------------------------------------------
// Completed segments
// ---------------------------------------------------------------------------

/// Why a WAV buffer was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// The gate closed a real segment.
    Complete,
    /// Short-form buffer delivered on `Ask`.
    Snapshot,
    /// Long-form buffer flushed on `Stop`.
    Flush,
}

/// A finalized WAV file, ready to persist or transmit as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSegment {
    /// Monotonically increasing publish sequence number.
    pub seq: u64,
    pub kind: SegmentKind,
    /// Header plus PCM payload.
    pub wav: Vec<u8>,
}

impl CompletedSegment {
    /// PCM bytes after the header.
    pub fn payload_len(&self) -> usize {
        self.wav.len().saturating_sub(HEADER_LEN)
    }

    pub fn summary(&self) -> SegmentSummary {
        let (frames, duration_ms) = match WavHeader::parse(&self.wav) {
            Ok(h) if h.block_align > 0 && h.sample_rate > 0 => {
                let frames = (self.payload_len() / h.block_align as usize) as u64;
                (frames, frames * 1_000 / h.sample_rate as u64)
            }
            _ => (0, 0),
        };
        SegmentSummary {
            seq: self.seq,
            kind: self.kind,
            data_bytes: self.payload_len(),
            frames,
            duration_ms,
        }
    }
}

/// Metadata line describing a published segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSummary {
    pub seq: u64,
    pub kind: SegmentKind,
    pub data_bytes: usize,
    pub frames: u64,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Engine status
// ---------------------------------------------------------------------------

/// Current state of the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, `start()` not yet called.
    Idle,
    /// Worker is pulling and gating blocks.
    Listening,
    /// Session ended: stopped or the source was exhausted.
    Stopped,
    /// Session ended with an error; restart required.
    Error,
}
