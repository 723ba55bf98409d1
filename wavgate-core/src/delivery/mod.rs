//! Control/delivery channel protocol between the encoder worker and its host.
//!
//! The worker owns every buffer; hosts only ever see finished WAV bytes and
//! the optional debug side channels. Types derive `serde` so hosts can log or
//! forward them.

pub mod debug;
pub mod events;

pub use debug::DebugTap;
pub use events::{CompletedSegment, Control, EngineStatus, SegmentKind, SegmentSummary};

use crossbeam_channel::Receiver;

use crate::buffering::block::SampleBlock;

/// Receiving ends handed to the host when a session starts.
#[derive(Debug)]
pub struct Deliveries {
    pub segments: Receiver<CompletedSegment>,
    /// Present when debug files are enabled.
    pub debug_files: Option<Receiver<String>>,
    /// Present when debug samples are enabled.
    pub debug_samples: Option<Receiver<Vec<SampleBlock>>>,
}
