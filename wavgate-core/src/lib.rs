//! # wavgate-core
//!
//! Activity-gated WAV segment encoder.
//!
//! ## Architecture
//!
//! ```text
//! SampleSource (mic ring / memory / channel)
//!        │ one 512-frame block per iteration
//!        ▼
//!  HysteresisGate ── pre-roll (31 blocks)
//!        │ Signal
//!        ▼
//!  OutputBuffer (header placeholder → PCM → finalized header)
//!        │
//!  crossbeam Sender<CompletedSegment>  ◄── Control (Ask / Stop)
//! ```
//!
//! The audio callback is zero-alloc. All buffering happens on the encoder
//! worker thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod source;
pub mod vad;
pub mod wav;

// Convenience re-exports for downstream crates
pub use audio::pcm::Format;
pub use buffering::block::{Frame, SampleBlock};
pub use delivery::{
    CompletedSegment, Control, Deliveries, EngineStatus, SegmentKind, SegmentSummary,
};
pub use engine::{DiagnosticsSnapshot, EncoderConfig, SessionEnd, WavGateEngine};
pub use error::{Result, WavGateError};
pub use source::{ChannelSource, MemorySource, SampleSource};
pub use vad::{ActivityGate, GateConfig, HysteresisGate, PeakChannel, Signal};
pub use wav::{encode, encode_to_vec, WavHeader};

#[cfg(feature = "audio-cpal")]
pub use source::CaptureSource;
