//! Activity gating.
//!
//! An [`ActivityGate`] looks at each sample block and tells the encoder what
//! to do with it. [`HysteresisGate`] is the stock implementation; other
//! detectors plug in behind the same trait without touching the pipeline.

pub mod hysteresis;

pub use hysteresis::{GateConfig, HysteresisGate};

use serde::{Deserialize, Serialize};

use crate::buffering::block::SampleBlock;

/// Which channels contribute to a block's peak amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakChannel {
    /// Left channel only.
    #[default]
    Left,
    /// Maximum over left and right.
    Both,
}

/// What the encoder should do with the block it just handed to the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Idle and silent: the gate kept the block as pre-roll.
    NoOp,
    /// Activity onset: write `pre_roll` (oldest first), then `block`.
    Init {
        pre_roll: Vec<SampleBlock>,
        block: SampleBlock,
    },
    /// Recording: append `block`.
    Continue(SampleBlock),
    /// End of a real segment: append `block`, then finalize and publish.
    Complete(SampleBlock),
    /// End of a spurious segment: discard everything buffered so far.
    Drop,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::NoOp => "noop",
            Signal::Init { .. } => "init",
            Signal::Continue(_) => "continue",
            Signal::Complete(_) => "complete",
            Signal::Drop => "drop",
        }
    }
}

/// Trait for all activity gates.
///
/// Gates own the pre-roll memory and every counter; the encoder only reacts
/// to the returned [`Signal`].
pub trait ActivityGate: Send + 'static {
    /// Classify `block` and advance the state machine.
    fn observe(&mut self, block: SampleBlock) -> Signal;

    /// Whether a segment is currently being recorded.
    fn is_recording(&self) -> bool;

    /// Return to idle and forget any remembered pre-roll.
    fn reset(&mut self);
}
