//! Peak-amplitude gate with hysteresis, pre-roll and fake-break rejection.
//!
//! ## Algorithm
//!
//! 1. Take the block's peak absolute amplitude. The block is *silent* when
//!    the peak is below the current threshold.
//! 2. Idle: a silent block goes into the pre-roll memory. A loud block
//!    starts a segment; the threshold drops to `on_threshold` so quieter
//!    trailing audio keeps the segment open.
//! 3. Recording: loud blocks reset the silence run and count as noise.
//!    Silent blocks extend the run; once it exceeds `wakeup_timeout` the
//!    segment ends. Fewer than `fake_break_limit` noisy blocks since onset
//!    means the segment was a glitch and is dropped.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ActivityGate, PeakChannel, Signal};
use crate::buffering::{block::SampleBlock, preroll::PreRoll, PRE_ROLL_BLOCKS};
use crate::error::{Result, WavGateError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct GateConfig {
    /// Threshold while recording. Normally below `off_threshold`.
    pub on_threshold: f64,
    /// Threshold while idle.
    pub off_threshold: f64,
    /// Consecutive silent blocks tolerated before a segment ends.
    pub wakeup_timeout: u32,
    /// Minimum noisy blocks after onset for a segment to be kept.
    pub fake_break_limit: u32,
    pub peak_channel: PeakChannel,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            on_threshold: 0.02,
            off_threshold: 0.05,
            wakeup_timeout: 20,
            fake_break_limit: 2,
            peak_channel: PeakChannel::Left,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("on_threshold", self.on_threshold),
            ("off_threshold", self.off_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(WavGateError::InvalidConfig(format!(
                    "{name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Recording { silent_run: u32, noisy_blocks: u32 },
}

#[derive(Debug)]
pub struct HysteresisGate {
    config: GateConfig,
    phase: Phase,
    memory: PreRoll,
}

impl HysteresisGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            memory: PreRoll::new(PRE_ROLL_BLOCKS),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Threshold the next block is compared against.
    pub fn threshold(&self) -> f64 {
        match self.phase {
            Phase::Idle => self.config.off_threshold,
            Phase::Recording { .. } => self.config.on_threshold,
        }
    }

    /// Blocks currently held as pre-roll.
    pub fn pre_roll_len(&self) -> usize {
        self.memory.len()
    }
}

impl ActivityGate for HysteresisGate {
    fn observe(&mut self, block: SampleBlock) -> Signal {
        let peak = block.peak(self.config.peak_channel);
        let silent = peak < self.threshold();

        match self.phase {
            Phase::Idle if silent => {
                self.memory.push(block);
                Signal::NoOp
            }
            Phase::Idle => {
                self.phase = Phase::Recording {
                    silent_run: 0,
                    noisy_blocks: 0,
                };
                let pre_roll = self.memory.drain();
                info!(
                    peak = format_args!("{peak:.4}"),
                    pre_roll_blocks = pre_roll.len(),
                    "activity onset"
                );
                Signal::Init { pre_roll, block }
            }
            Phase::Recording {
                silent_run,
                noisy_blocks,
            } if silent => {
                let silent_run = silent_run + 1;
                if silent_run <= self.config.wakeup_timeout {
                    self.phase = Phase::Recording {
                        silent_run,
                        noisy_blocks,
                    };
                    return Signal::Continue(block);
                }

                self.phase = Phase::Idle;
                if noisy_blocks < self.config.fake_break_limit {
                    info!(noisy_blocks, "back to silence — segment too short, dropping");
                    Signal::Drop
                } else {
                    info!(noisy_blocks, "back to silence — segment complete");
                    Signal::Complete(block)
                }
            }
            Phase::Recording { noisy_blocks, .. } => {
                debug!(peak = format_args!("{peak:.4}"), "silence run reset");
                self.phase = Phase::Recording {
                    silent_run: 0,
                    noisy_blocks: noisy_blocks + 1,
                };
                Signal::Continue(block)
            }
        }
    }

    fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::Recording { .. })
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.memory.clear();
    }
}
