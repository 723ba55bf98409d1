//! Typed sample block passed from the sample source to the gate and encoder.

use crate::vad::PeakChannel;

/// One stereo frame: `[left, right]`, normalized to [-1.0, 1.0].
pub type Frame = [f64; 2];

/// A contiguous run of stereo frames pulled from the source in one iteration.
///
/// Holds at most [`BLOCK_FRAMES`](super::BLOCK_FRAMES) frames; a short block
/// only appears when the source ran dry mid-pull.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    pub frames: Vec<Frame>,
}

impl SampleBlock {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// A block of `len` zero frames.
    pub fn silence(len: usize) -> Self {
        Self::new(vec![[0.0, 0.0]; len])
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Largest absolute amplitude in the block under the given channel policy.
    pub fn peak(&self, channel: PeakChannel) -> f64 {
        let frames = self.frames.iter();
        match channel {
            PeakChannel::Left => frames.map(|f| f[0].abs()).fold(0.0, f64::max),
            PeakChannel::Both => frames
                .map(|f| f[0].abs().max(f[1].abs()))
                .fold(0.0, f64::max),
        }
    }
}
