//! Output buffers: a placeholder header followed by appended PCM bytes.
//!
//! Any `Write + Seek` sink works. Finalizing seeks back to offset 0,
//! rewrites the header with the real sizes and hands the sink back.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use crate::audio::pcm::Format;
use crate::buffering::block::Frame;
use crate::error::{Result, WavGateError};
use crate::wav::header::{WavHeader, HEADER_LEN};

pub struct OutputBuffer<W: Write + Seek> {
    sink: W,
    format: Format,
    header: WavHeader,
    payload_len: usize,
    scratch: Vec<u8>,
}

/// An output buffer held entirely in memory.
pub type MemoryBuffer = OutputBuffer<Cursor<Vec<u8>>>;

/// An output buffer streamed to a file on disk.
pub type FileBuffer = OutputBuffer<BufWriter<File>>;

impl<W: Write + Seek> OutputBuffer<W> {
    /// Write a placeholder header into `sink` and return a buffer ready for
    /// appends.
    ///
    /// # Errors
    /// `InvalidFormat` for a bad format, `EncodeWrite` if the header cannot
    /// be written.
    pub fn new(mut sink: W, format: Format) -> Result<Self> {
        let header = WavHeader::build(&format)?;
        sink.write_all(&header.to_bytes())
            .map_err(WavGateError::EncodeWrite)?;
        Ok(Self {
            sink,
            format,
            header,
            payload_len: 0,
            scratch: Vec::new(),
        })
    }

    /// Encode `frames` and append them after whatever was written so far.
    pub fn append(&mut self, frames: &[Frame]) -> Result<()> {
        self.scratch.clear();
        self.format.encode_frames(frames, &mut self.scratch);
        self.sink
            .write_all(&self.scratch)
            .map_err(WavGateError::EncodeWrite)?;
        self.payload_len += self.scratch.len();
        Ok(())
    }

    /// PCM bytes appended since the header.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Rewrite the header with the final sizes and return the sink.
    ///
    /// The buffer is consumed either way; on error its contents must be
    /// treated as unusable.
    pub fn finalize(mut self) -> Result<W> {
        let header = self.header.finalized(self.payload_len)?;
        header
            .write_at_start(&mut self.sink)
            .and_then(|()| self.sink.flush())
            .map_err(WavGateError::EncodeWrite)?;
        Ok(self.sink)
    }
}

impl MemoryBuffer {
    pub fn in_memory(format: Format) -> Result<Self> {
        Self::new(Cursor::new(Vec::with_capacity(HEADER_LEN)), format)
    }

    /// Finalize and return the complete WAV file bytes.
    pub fn into_wav_bytes(self) -> Result<Vec<u8>> {
        Ok(self.finalize()?.into_inner())
    }
}

impl FileBuffer {
    /// Create (or truncate) `path` and write a placeholder header into it.
    pub fn create(path: &Path, format: Format) -> Result<Self> {
        let file = File::create(path).map_err(WavGateError::EncodeWrite)?;
        Self::new(BufWriter::new(file), format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn mono16() -> Format {
        Format::new(16_000, 1, 2).unwrap()
    }

    #[test]
    fn empty_buffer_finalizes_to_bare_header() {
        let bytes = MemoryBuffer::in_memory(mono16())
            .unwrap()
            .into_wav_bytes()
            .unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let header = WavHeader::parse(&bytes).unwrap();
        assert_eq!(header.data_size, 0);
        assert_eq!(header.file_size, 44);
    }

    #[test]
    fn appended_frames_land_after_header() {
        let mut buf = MemoryBuffer::in_memory(mono16()).unwrap();
        buf.append(&[[0.5, 0.5], [0.0, 0.0]]).unwrap();
        buf.append(&[[1.0, 1.0]]).unwrap();
        assert_eq!(buf.payload_len(), 6);

        let bytes = buf.into_wav_bytes().unwrap();
        assert_eq!(&bytes[44..], &[0xff, 0x3f, 0x00, 0x00, 0xff, 0x7f]);
        assert_eq!(WavHeader::parse(&bytes).unwrap().data_size, 6);
    }

    #[test]
    fn finalized_memory_buffer_is_readable_by_hound() {
        let format = Format::new(8_000, 2, 3).unwrap();
        let mut buf = MemoryBuffer::in_memory(format).unwrap();
        buf.append(&vec![[0.25, -0.25]; 100]).unwrap();
        let bytes = buf.into_wav_bytes().unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(spec.bits_per_sample, 24);
        assert_eq!(reader.duration(), 100);
    }

    #[test]
    fn file_buffer_finalizes_on_disk() {
        let dir = std::env::temp_dir().join(format!("wavgate-sink-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("file_buffer.wav");

        let mut buf = FileBuffer::create(&path, mono16()).unwrap();
        buf.append(&vec![[0.1, 0.1]; 512]).unwrap();
        drop(buf.finalize().unwrap());

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 44 + 1024);
        let header = WavHeader::parse(&bytes).unwrap();
        assert_eq!(header.data_size, 1024);
        assert_eq!(header.file_size, 44 + 1024);
        std::fs::remove_dir_all(&dir).ok();
    }

    struct FailingSink {
        accept: usize,
        inner: Cursor<Vec<u8>>,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.inner.get_ref().len() + buf.len() > self.accept {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FailingSink {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn write_failure_surfaces_as_encode_write() {
        let sink = FailingSink {
            accept: HEADER_LEN + 4,
            inner: Cursor::new(Vec::new()),
        };
        let mut buf = OutputBuffer::new(sink, mono16()).unwrap();
        buf.append(&[[0.0, 0.0], [0.0, 0.0]]).unwrap();
        let err = buf.append(&[[0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, WavGateError::EncodeWrite(_)));
    }
}
