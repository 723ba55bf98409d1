//! Pull-based sample sources.
//!
//! The encoder worker asks its source for one block per iteration. A source
//! either fills a prefix of the block, reports permanent exhaustion, or fails.
//! Sources may block inside [`SampleSource::pull`] until data is available.

#[cfg(feature = "audio-cpal")]
pub mod capture;

#[cfg(feature = "audio-cpal")]
pub use capture::CaptureSource;

use crossbeam_channel::Receiver;

use crate::buffering::block::{Frame, SampleBlock};
use crate::error::Result;

/// Contract for anything that streams stereo frames into the encoder.
pub trait SampleSource {
    /// Fill a prefix of `block` with the next frames.
    ///
    /// Returns `Ok(Some(n))` with the number of frames written (`n > 0`),
    /// `Ok(None)` once the stream is permanently exhausted.
    fn pull(&mut self, block: &mut [Frame]) -> Result<Option<usize>>;

    /// Native rate of the stream, when the source knows it.
    fn sample_rate(&self) -> Option<u32> {
        None
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn pull(&mut self, block: &mut [Frame]) -> Result<Option<usize>> {
        (**self).pull(block)
    }

    fn sample_rate(&self) -> Option<u32> {
        (**self).sample_rate()
    }
}

/// Replays frames held in memory, then reports exhaustion.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: Vec<Frame>,
    cursor: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, cursor: 0 }
    }

    pub fn from_blocks<I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = SampleBlock>,
    {
        Self::new(blocks.into_iter().flat_map(|b| b.frames).collect())
    }

    /// Frames not yet pulled.
    pub fn remaining(&self) -> usize {
        self.frames.len() - self.cursor
    }
}

impl SampleSource for MemorySource {
    fn pull(&mut self, block: &mut [Frame]) -> Result<Option<usize>> {
        let n = self.remaining().min(block.len());
        if n == 0 {
            return Ok(None);
        }
        block[..n].copy_from_slice(&self.frames[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(Some(n))
    }
}

/// Re-blocks frame batches produced on another thread.
///
/// Blocks until enough frames arrive to fill the requested block; once every
/// sender is dropped the leftover frames are served and the stream ends.
pub struct ChannelSource {
    rx: Receiver<Vec<Frame>>,
    pending: Vec<Frame>,
    sample_rate: Option<u32>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<Frame>>, sample_rate: Option<u32>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            sample_rate,
        }
    }
}

impl SampleSource for ChannelSource {
    fn pull(&mut self, block: &mut [Frame]) -> Result<Option<usize>> {
        while self.pending.len() < block.len() {
            match self.rx.recv() {
                Ok(batch) => self.pending.extend(batch),
                Err(_) => break,
            }
        }
        let n = self.pending.len().min(block.len());
        if n == 0 {
            return Ok(None);
        }
        block[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(Some(n))
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_serves_full_then_short_block_then_ends() {
        let mut src = MemorySource::new(vec![[0.1, 0.2]; 5]);
        let mut block = [[0.0; 2]; 3];
        assert_eq!(src.pull(&mut block).unwrap(), Some(3));
        assert_eq!(src.pull(&mut block).unwrap(), Some(2));
        assert_eq!(block[1], [0.1, 0.2]);
        assert_eq!(src.pull(&mut block).unwrap(), None);
        assert_eq!(src.pull(&mut block).unwrap(), None);
    }

    #[test]
    fn channel_source_reblocks_batches() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(vec![[0.5, 0.5]; 3]).unwrap();
        tx.send(vec![[0.25, 0.25]; 3]).unwrap();
        drop(tx);

        let mut src = ChannelSource::new(rx, Some(48_000));
        let mut block = [[0.0; 2]; 4];
        assert_eq!(src.pull(&mut block).unwrap(), Some(4));
        assert_eq!(block[3], [0.25, 0.25]);
        assert_eq!(src.pull(&mut block).unwrap(), Some(2));
        assert_eq!(src.pull(&mut block).unwrap(), None);
        assert_eq!(src.sample_rate(), Some(48_000));
    }
}
