//! Block-level buffering: the sample block type, the pre-roll memory and the
//! lock-free SPSC ring that carries captured frames off the audio callback.

pub mod block;
pub mod preroll;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Frames per sample block, shared by every component.
pub const BLOCK_FRAMES: usize = 512;

/// Depth of the pre-roll memory, in blocks.
pub const PRE_ROLL_BLOCKS: usize = 31;

/// Producer half, held by the audio callback thread.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the encoder worker.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// Capacity in interleaved stereo f32 values: 2^21 ≈ 21.8 s at 48 kHz.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 21;

/// Create a matched producer/consumer pair for interleaved `[left, right]`
/// f32 samples.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(CAPTURE_RING_CAPACITY).split()
}
