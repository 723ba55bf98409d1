//! Blocking encoder loop.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Poll the control mailbox (non-blocking)
//!    Ask  → publish the short-form snapshot, keep going
//!    Stop → flush the long-form buffer, return
//! 2. Pull one block from the source (None → exhausted, flush, return)
//! 3. Gate the block → Signal
//! 4. Apply the signal to the active buffer:
//!    NoOp      nothing
//!    Init      pre-roll blocks, then the block
//!    Continue  the block
//!    Complete  the block, finalize, publish, fresh buffer
//!    Drop      discard, fresh buffer
//! ```
//!
//! The loop is the only code touching its buffers and the gate, so none of
//! that state is locked. Any write or finalize failure ends the session.

use std::mem;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, info_span, warn, Span};

use crate::{
    audio::pcm::Format,
    buffering::{
        block::{Frame, SampleBlock},
        BLOCK_FRAMES,
    },
    delivery::{CompletedSegment, Control, DebugTap, SegmentKind},
    error::{Result, WavGateError},
    source::SampleSource,
    vad::{ActivityGate, Signal},
    wav::MemoryBuffer,
};

pub struct PipelineDiagnostics {
    pub blocks_pulled: AtomicUsize,
    pub silent_blocks: AtomicUsize,
    pub onsets: AtomicUsize,
    pub segments_published: AtomicUsize,
    pub segments_dropped: AtomicUsize,
    pub snapshots: AtomicUsize,
    pub bytes_published: AtomicUsize,
    pub deliveries_dropped: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            blocks_pulled: AtomicUsize::new(0),
            silent_blocks: AtomicUsize::new(0),
            onsets: AtomicUsize::new(0),
            segments_published: AtomicUsize::new(0),
            segments_dropped: AtomicUsize::new(0),
            snapshots: AtomicUsize::new(0),
            bytes_published: AtomicUsize::new(0),
            deliveries_dropped: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.blocks_pulled.store(0, Ordering::Relaxed);
        self.silent_blocks.store(0, Ordering::Relaxed);
        self.onsets.store(0, Ordering::Relaxed);
        self.segments_published.store(0, Ordering::Relaxed);
        self.segments_dropped.store(0, Ordering::Relaxed);
        self.snapshots.store(0, Ordering::Relaxed);
        self.bytes_published.store(0, Ordering::Relaxed);
        self.deliveries_dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_pulled: self.blocks_pulled.load(Ordering::Relaxed),
            silent_blocks: self.silent_blocks.load(Ordering::Relaxed),
            onsets: self.onsets.load(Ordering::Relaxed),
            segments_published: self.segments_published.load(Ordering::Relaxed),
            segments_dropped: self.segments_dropped.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub blocks_pulled: usize,
    pub silent_blocks: usize,
    pub onsets: usize,
    pub segments_published: usize,
    pub segments_dropped: usize,
    pub snapshots: usize,
    pub bytes_published: usize,
    pub deliveries_dropped: usize,
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The source reported permanent exhaustion.
    Exhausted,
    /// A `Stop` control was handled.
    Stopped,
}

/// All context the pipeline needs, passed as one struct so the worker
/// closure stays tidy.
pub struct PipelineContext {
    pub format: Format,
    pub gate: Box<dyn ActivityGate>,
    pub source: Box<dyn SampleSource>,
    /// `None` disables `Ask`/`Stop` handling and snapshots.
    pub control_rx: Option<Receiver<Control>>,
    pub segment_tx: Sender<CompletedSegment>,
    pub debug: Option<DebugTap>,
    /// Longest a publish may stall on a full channel before dropping.
    pub delivery_timeout: Duration,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Level log cadence, in blocks.
const LEVEL_LOG_EVERY: usize = 100;

/// Run the blocking encoder loop until the source is exhausted, a `Stop`
/// arrives, or a fatal error occurs.
pub fn run(mut ctx: PipelineContext) -> Result<SessionEnd> {
    if let Some(rate) = ctx.source.sample_rate() {
        if rate != ctx.format.sample_rate {
            info!(
                configured = ctx.format.sample_rate,
                source = rate,
                "using the source's native sample rate"
            );
            ctx.format.sample_rate = rate;
            ctx.format.validate()?;
        }
    }
    info!(
        sample_rate = ctx.format.sample_rate,
        channels = ctx.format.channels,
        precision = ctx.format.precision,
        "pipeline started"
    );

    let result = PerpetualEncoder::new(ctx).and_then(|mut enc| enc.run_loop());
    match &result {
        Ok(end) => info!(?end, "pipeline finished"),
        Err(e) => error!("pipeline failed: {e}"),
    }
    result
}

struct PerpetualEncoder {
    ctx: PipelineContext,
    /// Long-form buffer for the current segment.
    active: MemoryBuffer,
    /// Short-form buffer: the current segment's audio since the last `Ask`.
    snapshot: Option<MemoryBuffer>,
    /// Raw blocks of the current segment, kept only for debug samples.
    segment_blocks: Vec<SampleBlock>,
    scratch: Vec<Frame>,
    segment_span: Option<Span>,
}

impl PerpetualEncoder {
    fn new(ctx: PipelineContext) -> Result<Self> {
        let active = MemoryBuffer::in_memory(ctx.format)?;
        let snapshot = match ctx.control_rx {
            Some(_) => Some(MemoryBuffer::in_memory(ctx.format)?),
            None => None,
        };
        Ok(Self {
            ctx,
            active,
            snapshot,
            segment_blocks: Vec::new(),
            scratch: vec![[0.0; 2]; BLOCK_FRAMES],
            segment_span: None,
        })
    }

    fn run_loop(&mut self) -> Result<SessionEnd> {
        loop {
            // ── 0. Control mailbox ───────────────────────────────────────
            match self.poll_control() {
                Some(Control::Stop) => {
                    info!("stop requested");
                    self.flush_long_form()?;
                    return Ok(SessionEnd::Stopped);
                }
                Some(Control::Ask) => self.publish_snapshot()?,
                None => {}
            }

            // ── 1. Pull ─────────────────────────────────────────────────
            let Some(n) = self.ctx.source.pull(&mut self.scratch)? else {
                info!("sample source exhausted");
                self.flush_long_form()?;
                return Ok(SessionEnd::Exhausted);
            };
            let blocks_pulled = self
                .ctx
                .diagnostics
                .blocks_pulled
                .fetch_add(1, Ordering::Relaxed)
                + 1;
            let block = SampleBlock::new(self.scratch[..n].to_vec());

            // ── 2. Gate ─────────────────────────────────────────────────
            let signal = self.ctx.gate.observe(block);

            if blocks_pulled % LEVEL_LOG_EVERY == 0 {
                debug!(
                    blocks_pulled,
                    recording = self.ctx.gate.is_recording(),
                    payload = self.active.payload_len(),
                    "encoder progress"
                );
            }

            // ── 3. Apply ────────────────────────────────────────────────
            self.apply(signal)?;
        }
    }

    fn poll_control(&self) -> Option<Control> {
        let rx = self.ctx.control_rx.as_ref()?;
        match rx.try_recv() {
            Ok(control) => Some(control),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn apply(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::NoOp => {
                self.ctx
                    .diagnostics
                    .silent_blocks
                    .fetch_add(1, Ordering::Relaxed);
            }
            Signal::Init { pre_roll, block } => {
                let onset = self.ctx.diagnostics.onsets.fetch_add(1, Ordering::Relaxed);
                let span = info_span!("segment", onset);
                {
                    let _enter = span.enter();
                    debug!(pre_roll_blocks = pre_roll.len(), "writing pre-roll");
                }
                self.segment_span = Some(span);
                for b in pre_roll {
                    self.append(b)?;
                }
                self.append(block)?;
            }
            Signal::Continue(block) => self.append(block)?,
            Signal::Complete(block) => {
                self.append(block)?;
                self.publish_active(SegmentKind::Complete)?;
            }
            Signal::Drop => self.discard_active()?,
        }
        Ok(())
    }

    fn append(&mut self, block: SampleBlock) -> Result<()> {
        self.active.append(&block.frames)?;
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.append(&block.frames)?;
        }
        if self.ctx.debug.as_ref().is_some_and(DebugTap::wants_samples) {
            self.segment_blocks.push(block);
        }
        Ok(())
    }

    fn fresh_buffer(&self) -> Result<MemoryBuffer> {
        MemoryBuffer::in_memory(self.ctx.format)
    }

    /// Swap in fresh buffers, returning the finished long-form one.
    fn rotate(&mut self) -> Result<MemoryBuffer> {
        let fresh = self.fresh_buffer()?;
        if self.snapshot.is_some() {
            self.snapshot = Some(self.fresh_buffer()?);
        }
        self.segment_span = None;
        Ok(mem::replace(&mut self.active, fresh))
    }

    fn publish_active(&mut self, kind: SegmentKind) -> Result<()> {
        let span = self.segment_span.clone().unwrap_or_else(Span::none);
        let _enter = span.enter();

        let finished = self.rotate()?;
        let wav = finished.into_wav_bytes()?;
        let blocks = mem::take(&mut self.segment_blocks);
        let debug_copy = self.ctx.debug.as_ref().map(|_| wav.clone());

        self.deliver(kind, wav)?;

        if let (Some(tap), Some(wav)) = (self.ctx.debug.as_mut(), debug_copy) {
            tap.publish(&wav, blocks, self.ctx.delivery_timeout);
        }
        Ok(())
    }

    fn discard_active(&mut self) -> Result<()> {
        let span = self.segment_span.clone().unwrap_or_else(Span::none);
        let _enter = span.enter();

        let dropped = self.rotate()?;
        self.segment_blocks.clear();
        self.ctx
            .diagnostics
            .segments_dropped
            .fetch_add(1, Ordering::Relaxed);
        warn!(
            discarded_bytes = dropped.payload_len(),
            "spurious segment discarded"
        );
        Ok(())
    }

    /// Deliver the short-form buffer and start a new one. The long-form
    /// buffer is left untouched.
    fn publish_snapshot(&mut self) -> Result<()> {
        let Some(current) = self.snapshot.take() else {
            return Ok(());
        };
        self.snapshot = Some(self.fresh_buffer()?);
        let wav = current.into_wav_bytes()?;
        self.ctx.diagnostics.snapshots.fetch_add(1, Ordering::Relaxed);
        self.deliver(SegmentKind::Snapshot, wav)
    }

    /// Publish the long-form buffer if it holds any audio.
    fn flush_long_form(&mut self) -> Result<()> {
        if self.active.payload_len() == 0 {
            debug!("nothing buffered, no flush");
            return Ok(());
        }
        self.publish_active(SegmentKind::Flush)?;
        self.ctx.gate.reset();
        Ok(())
    }

    fn deliver(&mut self, kind: SegmentKind, wav: Vec<u8>) -> Result<()> {
        let seq = self.ctx.seq.fetch_add(1, Ordering::Relaxed);
        let segment = CompletedSegment { seq, kind, wav };
        let data_bytes = segment.payload_len();

        match self
            .ctx
            .segment_tx
            .send_timeout(segment, self.ctx.delivery_timeout)
        {
            Ok(()) => {
                let d = &self.ctx.diagnostics;
                d.segments_published.fetch_add(1, Ordering::Relaxed);
                d.bytes_published.fetch_add(data_bytes, Ordering::Relaxed);
                info!(seq, ?kind, data_bytes, "segment published");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.ctx
                    .diagnostics
                    .deliveries_dropped
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    seq,
                    ?kind,
                    timeout_ms = self.ctx.delivery_timeout.as_millis() as u64,
                    "segment receiver too slow — segment dropped"
                );
                Ok(())
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(WavGateError::DeliveryClosed("completed segments"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::{GateConfig, HysteresisGate};
    use crate::wav::WavHeader;
    use std::collections::VecDeque;

    const LOUD: f64 = 0.5;

    struct ScriptedSource {
        blocks: VecDeque<SampleBlock>,
        pulls: Arc<AtomicUsize>,
        /// `(pull number, control)` pairs injected while pulling.
        inject: Vec<(usize, Control)>,
        control_tx: Option<Sender<Control>>,
        rate: Option<u32>,
        fail_at: Option<usize>,
    }

    impl ScriptedSource {
        fn new(blocks: Vec<SampleBlock>) -> Self {
            Self {
                blocks: blocks.into(),
                pulls: Arc::new(AtomicUsize::new(0)),
                inject: Vec::new(),
                control_tx: None,
                rate: None,
                fail_at: None,
            }
        }
    }

    impl SampleSource for ScriptedSource {
        fn pull(&mut self, block: &mut [Frame]) -> Result<Option<usize>> {
            let count = self.pulls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_at == Some(count) {
                return Err(WavGateError::Source("device unplugged".into()));
            }
            if let Some(tx) = &self.control_tx {
                for (_, control) in self.inject.iter().filter(|(at, _)| *at == count) {
                    tx.send(*control).unwrap();
                }
            }
            let Some(next) = self.blocks.pop_front() else {
                return Ok(None);
            };
            block[..next.len()].copy_from_slice(&next.frames);
            Ok(Some(next.len()))
        }

        fn sample_rate(&self) -> Option<u32> {
            self.rate
        }
    }

    fn mono16() -> Format {
        Format::new(16_000, 1, 2).unwrap()
    }

    fn gate(wakeup_timeout: u32) -> Box<dyn ActivityGate> {
        Box::new(HysteresisGate::new(GateConfig {
            on_threshold: 0.02,
            off_threshold: 0.05,
            wakeup_timeout,
            ..GateConfig::default()
        }))
    }

    fn block(amplitude: f64) -> SampleBlock {
        SampleBlock::new(vec![[amplitude, amplitude]; BLOCK_FRAMES])
    }

    fn encoded(format: Format, blocks: &[SampleBlock]) -> Vec<u8> {
        let mut out = Vec::new();
        for b in blocks {
            format.encode_frames(&b.frames, &mut out);
        }
        out
    }

    struct Harness {
        ctx: PipelineContext,
        segments: Receiver<CompletedSegment>,
        diagnostics: Arc<PipelineDiagnostics>,
    }

    fn harness(source: ScriptedSource, wakeup_timeout: u32) -> Harness {
        let (segment_tx, segments) = crossbeam_channel::unbounded();
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let ctx = PipelineContext {
            format: mono16(),
            gate: gate(wakeup_timeout),
            source: Box::new(source),
            control_rx: None,
            segment_tx,
            debug: None,
            delivery_timeout: Duration::from_millis(50),
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::clone(&diagnostics),
        };
        Harness {
            ctx,
            segments,
            diagnostics,
        }
    }

    fn with_control(source: &mut ScriptedSource, h: &mut Harness) {
        let (tx, rx) = crossbeam_channel::unbounded();
        source.control_tx = Some(tx);
        h.ctx.control_rx = Some(rx);
    }

    #[test]
    fn run_publishes_one_segment_with_pre_roll_and_trailing_silence() {
        // 40 quiet blocks with distinct levels, 3 loud, 10 silent.
        let quiet: Vec<SampleBlock> = (0..40).map(|i| block(i as f64 * 0.001)).collect();
        let mut blocks = quiet.clone();
        blocks.extend((0..3).map(|_| block(LOUD)));
        blocks.extend((0..10).map(|_| block(0.0)));

        let h = harness(ScriptedSource::new(blocks.clone()), 5);
        let end = run(h.ctx).unwrap();
        assert_eq!(end, SessionEnd::Exhausted);

        let published: Vec<_> = h.segments.try_iter().collect();
        assert_eq!(published.len(), 1);
        let segment = &published[0];
        assert_eq!(segment.kind, SegmentKind::Complete);
        assert_eq!(segment.seq, 0);

        // 31 newest quiet blocks (9..40) + 3 loud + first 6 silent.
        let expected = encoded(mono16(), &blocks[9..49]);
        let header = WavHeader::parse(&segment.wav).unwrap();
        assert_eq!(header.data_size as usize, 40 * BLOCK_FRAMES * 2);
        assert_eq!(header.file_size as usize, 44 + 40 * BLOCK_FRAMES * 2);
        assert_eq!(&segment.wav[44..], expected.as_slice());

        let d = h.diagnostics.snapshot();
        assert_eq!(d.blocks_pulled, 53);
        assert_eq!(d.silent_blocks, 44);
        assert_eq!(d.onsets, 1);
        assert_eq!(d.segments_published, 1);
        assert_eq!(d.bytes_published, expected.len());
    }

    #[test]
    fn run_drops_short_burst_without_publishing() {
        let mut blocks = vec![block(0.0); 3];
        blocks.push(block(LOUD));
        blocks.extend(vec![block(0.0); 4]);

        let h = harness(ScriptedSource::new(blocks), 2);
        run(h.ctx).unwrap();

        assert!(h.segments.try_recv().is_err());
        let d = h.diagnostics.snapshot();
        assert_eq!(d.segments_dropped, 1);
        assert_eq!(d.segments_published, 0);
    }

    #[test]
    fn stop_flushes_bytes_written_so_far_and_stops_pulling() {
        let mut blocks = vec![block(0.0); 2];
        blocks.extend(vec![block(LOUD); 3]);
        blocks.extend(vec![block(LOUD); 10]);

        let mut source = ScriptedSource::new(blocks.clone());
        source.inject = vec![(5, Control::Stop)];
        let pulls = Arc::clone(&source.pulls);
        let mut h = harness(ScriptedSource::new(Vec::new()), 5);
        with_control(&mut source, &mut h);
        h.ctx.source = Box::new(source);

        assert_eq!(run(h.ctx).unwrap(), SessionEnd::Stopped);
        assert_eq!(pulls.load(Ordering::SeqCst), 5);

        let published: Vec<_> = h.segments.try_iter().collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].kind, SegmentKind::Flush);
        assert_eq!(published[0].wav[44..], encoded(mono16(), &blocks[..5])[..]);
    }

    #[test]
    fn stop_while_idle_publishes_nothing() {
        let mut source = ScriptedSource::new(vec![block(0.0); 10]);
        source.inject = vec![(2, Control::Stop)];
        let mut h = harness(ScriptedSource::new(Vec::new()), 5);
        with_control(&mut source, &mut h);
        h.ctx.source = Box::new(source);

        assert_eq!(run(h.ctx).unwrap(), SessionEnd::Stopped);
        assert!(h.segments.try_recv().is_err());
    }

    #[test]
    fn ask_delivers_snapshot_and_keeps_the_segment_open() {
        let mut blocks = vec![block(0.0); 2];
        blocks.extend(vec![block(LOUD); 4]);
        blocks.extend(vec![block(0.0); 3]);

        let mut source = ScriptedSource::new(blocks.clone());
        // Ask lands after the 4th pull: pre-roll (2) + 2 loud blocks so far.
        source.inject = vec![(4, Control::Ask)];
        let mut h = harness(ScriptedSource::new(Vec::new()), 1);
        with_control(&mut source, &mut h);
        h.ctx.source = Box::new(source);

        run(h.ctx).unwrap();
        let published: Vec<_> = h.segments.try_iter().collect();
        assert_eq!(published.len(), 2);

        assert_eq!(published[0].kind, SegmentKind::Snapshot);
        assert_eq!(published[0].wav[44..], encoded(mono16(), &blocks[..4])[..]);

        // The long-form buffer still holds the whole segment: 2 pre-roll,
        // 4 loud, 2 silent (the second one exceeds a timeout of 1).
        assert_eq!(published[1].kind, SegmentKind::Complete);
        assert_eq!(published[1].wav[44..], encoded(mono16(), &blocks[..8])[..]);
        assert_eq!(published[1].seq, published[0].seq + 1);
        assert_eq!(h.diagnostics.snapshot().snapshots, 1);
    }

    #[test]
    fn exhaustion_while_recording_flushes_the_open_segment() {
        let mut blocks = vec![block(0.0); 1];
        blocks.extend(vec![block(LOUD); 3]);

        let h = harness(ScriptedSource::new(blocks.clone()), 5);
        assert_eq!(run(h.ctx).unwrap(), SessionEnd::Exhausted);

        let segment = h.segments.try_recv().unwrap();
        assert_eq!(segment.kind, SegmentKind::Flush);
        assert_eq!(segment.wav[44..], encoded(mono16(), &blocks)[..]);
    }

    #[test]
    fn consecutive_segments_get_fresh_buffers() {
        let mut blocks = Vec::new();
        for _ in 0..2 {
            blocks.extend(vec![block(LOUD); 3]);
            blocks.extend(vec![block(0.0); 2]);
        }
        let h = harness(ScriptedSource::new(blocks.clone()), 1);
        run(h.ctx).unwrap();

        let published: Vec<_> = h.segments.try_iter().collect();
        assert_eq!(published.len(), 2);
        for segment in &published {
            assert_eq!(segment.kind, SegmentKind::Complete);
            assert_eq!(segment.wav[44..], encoded(mono16(), &blocks[..5])[..]);
        }
    }

    #[test]
    fn debug_samples_carry_the_segment_blocks() {
        let mut blocks = vec![block(0.0); 2];
        blocks.extend(vec![block(LOUD); 3]);
        blocks.extend(vec![block(0.0); 2]);

        let (samples_tx, samples_rx) = crossbeam_channel::unbounded();
        let mut h = harness(ScriptedSource::new(blocks.clone()), 1);
        h.ctx.debug = Some(DebugTap::new().with_samples(samples_tx));
        run(h.ctx).unwrap();

        let recorded = samples_rx.try_recv().unwrap();
        assert_eq!(recorded, blocks);
        assert!(h.segments.try_recv().is_ok());
    }

    #[test]
    fn closed_segment_receiver_ends_the_session() {
        let mut blocks = vec![block(LOUD); 3];
        blocks.extend(vec![block(0.0); 2]);
        let h = harness(ScriptedSource::new(blocks), 1);
        drop(h.segments);

        let err = run(h.ctx).unwrap_err();
        assert!(matches!(err, WavGateError::DeliveryClosed(_)));
    }

    #[test]
    fn full_segment_channel_drops_after_timeout() {
        let mut blocks = Vec::new();
        for _ in 0..2 {
            blocks.extend(vec![block(LOUD); 3]);
            blocks.extend(vec![block(0.0); 2]);
        }
        let mut h = harness(ScriptedSource::new(blocks), 1);
        let (segment_tx, segments) = crossbeam_channel::bounded(1);
        h.ctx.segment_tx = segment_tx;
        h.ctx.delivery_timeout = Duration::from_millis(5);

        assert_eq!(run(h.ctx).unwrap(), SessionEnd::Exhausted);
        assert_eq!(segments.len(), 1);
        let d = h.diagnostics.snapshot();
        assert_eq!(d.segments_published, 1);
        assert_eq!(d.deliveries_dropped, 1);
    }

    #[test]
    fn source_error_is_fatal() {
        let mut source = ScriptedSource::new(vec![block(LOUD); 4]);
        source.fail_at = Some(3);
        let h = harness(source, 5);
        let err = run(h.ctx).unwrap_err();
        assert!(matches!(err, WavGateError::Source(_)));
        assert!(h.segments.try_recv().is_err());
    }

    #[test]
    fn source_rate_overrides_configured_rate() {
        let mut blocks = vec![block(LOUD); 3];
        blocks.extend(vec![block(0.0); 2]);
        let mut source = ScriptedSource::new(blocks);
        source.rate = Some(48_000);
        let h = harness(source, 1);
        run(h.ctx).unwrap();

        let segment = h.segments.try_recv().unwrap();
        let header = WavHeader::parse(&segment.wav).unwrap();
        assert_eq!(header.sample_rate, 48_000);
        assert_eq!(header.byte_rate, 96_000);
    }

    #[test]
    fn unusable_source_rate_fails_before_pulling() {
        let mut source = ScriptedSource::new(vec![block(LOUD); 3]);
        source.rate = Some(u32::MAX);
        let pulls = Arc::clone(&source.pulls);
        let h = harness(source, 1);

        let err = run(h.ctx).unwrap_err();
        assert!(matches!(err, WavGateError::InvalidFormat(_)));
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
        assert!(h.segments.try_recv().is_err());
    }
}
