//! Optional debug side channels for completed segments.
//!
//! The encoder holds an `Option<DebugTap>`; with no tap every debug send is
//! skipped. Failures here are logged and never end the capture session.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};
use tracing::{debug, warn};

use crate::buffering::block::SampleBlock;

const DEBUG_FILE_PREFIX: &str = "debug_wav";

struct DebugFiles {
    dir: PathBuf,
    count: u64,
    names: Sender<String>,
}

/// Debug outputs attached to the encoder.
#[derive(Default)]
pub struct DebugTap {
    files: Option<DebugFiles>,
    samples: Option<Sender<Vec<SampleBlock>>>,
}

impl DebugTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every completed segment to `dir/debug_wav<N>.wav` and announce
    /// the path on `names`.
    pub fn with_files(mut self, dir: PathBuf, names: Sender<String>) -> Self {
        self.files = Some(DebugFiles {
            dir,
            count: 0,
            names,
        });
        self
    }

    /// Send the raw blocks of every completed segment on `samples`.
    pub fn with_samples(mut self, samples: Sender<Vec<SampleBlock>>) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Whether the encoder must keep a copy of each segment's blocks.
    pub fn wants_samples(&self) -> bool {
        self.samples.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_none() && self.samples.is_none()
    }

    /// Emit debug artifacts for one completed segment.
    pub fn publish(&mut self, wav: &[u8], blocks: Vec<SampleBlock>, timeout: Duration) {
        if let Some(files) = self.files.as_mut() {
            files.count += 1;
            let path = files
                .dir
                .join(format!("{DEBUG_FILE_PREFIX}{}.wav", files.count));
            match fs::write(&path, wav) {
                Ok(()) => {
                    let name = path.display().to_string();
                    debug!(file = %name, "debug segment written");
                    send_or_warn(&files.names, name, timeout, "debug file name");
                }
                Err(e) => warn!(path = %path.display(), "failed to write debug segment: {e}"),
            }
        }
        if let Some(samples) = self.samples.as_ref() {
            send_or_warn(samples, blocks, timeout, "debug samples");
        }
    }
}

fn send_or_warn<T>(tx: &Sender<T>, value: T, timeout: Duration, what: &str) {
    match tx.send_timeout(value, timeout) {
        Ok(()) => {}
        Err(SendTimeoutError::Timeout(_)) => warn!("{what} receiver too slow — dropped"),
        Err(SendTimeoutError::Disconnected(_)) => debug!("{what} receiver gone"),
    }
}
