//! WAV container support: header codec, output buffers and the one-shot
//! (ungated) encoders.

pub mod header;
pub mod sink;

pub use header::{WavHeader, HEADER_LEN};
pub use sink::{FileBuffer, MemoryBuffer, OutputBuffer};

use std::io::{Seek, Write};

use tracing::debug;

use crate::audio::pcm::Format;
use crate::buffering::BLOCK_FRAMES;
use crate::error::Result;
use crate::source::SampleSource;

/// Encode everything `source` yields into `sink` as a single WAV stream,
/// finalizing the header once the source is exhausted.
///
/// # Errors
/// `InvalidFormat` before anything is written, `EncodeWrite` on sink
/// failures, or whatever error the source reports.
pub fn encode<W, S>(sink: W, source: &mut S, format: Format) -> Result<W>
where
    W: Write + Seek,
    S: SampleSource + ?Sized,
{
    let mut out = OutputBuffer::new(sink, format)?;
    let mut block = vec![[0.0; 2]; BLOCK_FRAMES];
    while let Some(n) = source.pull(&mut block)? {
        out.append(&block[..n])?;
    }
    debug!(payload = out.payload_len(), "one-shot encode finished");
    out.finalize()
}

/// [`encode`] into a fresh in-memory buffer.
pub fn encode_to_vec<S>(source: &mut S, format: Format) -> Result<Vec<u8>>
where
    S: SampleSource + ?Sized,
{
    let sink = encode(std::io::Cursor::new(Vec::new()), source, format)?;
    Ok(sink.into_inner())
}
