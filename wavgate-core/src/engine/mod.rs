//! `WavGateEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! WavGateEngine::new(config)   → config validated, status = Idle
//!     └─► start(source)        → worker spawned, status = Listening
//!         ├─► ask()            → snapshot of the in-progress segment
//!         └─► stop()           → long-form flush, worker exits, status = Stopped
//!             └─► join()       → how the session ended
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send`, so sources are opened *inside* the worker by a
//! factory closure and never cross a thread boundary. A oneshot channel
//! carries open errors back to the `start_with()` caller.

pub mod pipeline;

use std::fs;
use std::path::PathBuf;
use std::sync::{atomic::AtomicU64, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    audio::pcm::Format,
    delivery::{Control, DebugTap, Deliveries, EngineStatus},
    error::{Result, WavGateError},
    source::SampleSource,
    vad::{ActivityGate, GateConfig, HysteresisGate},
};

pub use pipeline::{DiagnosticsSnapshot, PipelineDiagnostics, SessionEnd};

const WORKER_THREAD_NAME: &str = "wavgate-encoder";

/// Configuration for `WavGateEngine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EncoderConfig {
    /// Rate written to the header when the source does not report one.
    pub sample_rate: u32,
    /// Output channels: 1 (left/right averaged) or 2.
    pub channels: u16,
    /// Bytes per sample, 1 to 3.
    pub precision: u16,
    pub gate: GateConfig,
    /// Write every completed segment to `debug_dir`.
    pub debug_files: bool,
    pub debug_dir: PathBuf,
    /// Send every completed segment's raw blocks to the host.
    pub debug_samples: bool,
    /// Completed segments buffered for a slow host.
    pub delivery_capacity: usize,
    /// Longest a publish may stall on a full channel before the segment is
    /// dropped.
    pub delivery_timeout_ms: u64,
    /// Capture sessions fail once the input device delivers nothing for
    /// this long.
    pub capture_stall_timeout_ms: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 2,
            precision: 2,
            gate: GateConfig::default(),
            debug_files: false,
            debug_dir: PathBuf::from("wavgate-debug"),
            debug_samples: false,
            delivery_capacity: 16,
            delivery_timeout_ms: 2_000,
            capture_stall_timeout_ms: 2_000,
        }
    }
}

impl EncoderConfig {
    pub fn format(&self) -> Format {
        Format {
            sample_rate: self.sample_rate,
            channels: self.channels,
            precision: self.precision,
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn capture_stall_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_stall_timeout_ms)
    }

    /// Reject configurations the worker could not run with.
    pub fn validate(&self) -> Result<Format> {
        let format = self.format();
        format.validate()?;
        self.gate.validate()?;
        if self.delivery_capacity == 0 {
            return Err(WavGateError::InvalidConfig(
                "delivery_capacity must be at least 1".into(),
            ));
        }
        if self.capture_stall_timeout_ms == 0 {
            return Err(WavGateError::InvalidConfig(
                "capture_stall_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(format)
    }
}

/// The top-level engine handle.
///
/// `WavGateEngine` is `Send + Sync`: all fields use interior mutability.
pub struct WavGateEngine {
    config: EncoderConfig,
    format: Format,
    status: Arc<Mutex<EngineStatus>>,
    control_tx: Mutex<Option<Sender<Control>>>,
    worker: Mutex<Option<JoinHandle<Result<SessionEnd>>>>,
    /// Publish sequence counter, continued across sessions.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl WavGateEngine {
    /// Create a new engine. Does not start encoding; call `start()`.
    ///
    /// # Errors
    /// `InvalidFormat` / `InvalidConfig` for an unusable configuration.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        let format = config.validate()?;
        Ok(Self {
            config,
            format,
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            control_tx: Mutex::new(None),
            worker: Mutex::new(None),
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Output format; the sample rate may be replaced by the source's own.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Start a session over a ready-made, sendable source.
    pub fn start<S>(&self, source: S) -> Result<Deliveries>
    where
        S: SampleSource + Send + 'static,
    {
        self.start_with(move || Ok(source))
    }

    /// Start a session capturing from an input device.
    #[cfg(feature = "audio-cpal")]
    pub fn start_capture(&self, preferred_input_device: Option<String>) -> Result<Deliveries> {
        let stall_timeout = self.config.capture_stall_timeout();
        self.start_with(move || {
            crate::source::CaptureSource::open(preferred_input_device.as_deref())
                .map(|source| source.with_stall_timeout(stall_timeout))
        })
    }

    /// Start a session whose source is opened on the worker thread.
    ///
    /// Blocks until `open` has returned, then hands back the receiving ends.
    ///
    /// # Errors
    /// - `AlreadyRunning` if a session is still active.
    /// - Whatever `open` returns.
    pub fn start_with<F, S>(&self, open: F) -> Result<Deliveries>
    where
        F: FnOnce() -> Result<S> + Send + 'static,
        S: SampleSource + 'static,
    {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(WavGateError::AlreadyRunning);
        }
        if let Some(previous) = worker.take() {
            // Result of a session nobody joined.
            let _ = previous.join();
        }

        self.diagnostics.reset();
        self.set_status(EngineStatus::Listening);

        let (segment_tx, segment_rx) = bounded(self.config.delivery_capacity);
        let (control_tx, control_rx) = unbounded();
        let mut deliveries = Deliveries {
            segments: segment_rx,
            debug_files: None,
            debug_samples: None,
        };
        let debug = match self.debug_tap(&mut deliveries) {
            Ok(tap) => tap,
            Err(e) => {
                self.set_status(EngineStatus::Error);
                return Err(e);
            }
        };

        let format = self.format;
        let gate: Box<dyn ActivityGate> = Box::new(HysteresisGate::new(self.config.gate));
        let delivery_timeout = self.config.delivery_timeout();
        let status = Arc::clone(&self.status);
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Oneshot: the worker reports whether the source opened.
        let (open_tx, open_rx) = bounded::<Result<Option<u32>>>(1);

        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                // ── Open source on THIS thread (capture streams are !Send) ──
                let source = match open() {
                    Ok(s) => {
                        let _ = open_tx.send(Ok(s.sample_rate()));
                        s
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return Err(WavGateError::Source("source failed to open".into()));
                    }
                };

                let result = pipeline::run(pipeline::PipelineContext {
                    format,
                    gate,
                    source: Box::new(source),
                    control_rx: Some(control_rx),
                    segment_tx,
                    debug,
                    delivery_timeout,
                    seq,
                    diagnostics,
                });

                *status.lock() = match &result {
                    Ok(_) => EngineStatus::Stopped,
                    Err(_) => EngineStatus::Error,
                };
                result
            });

        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                self.set_status(EngineStatus::Error);
                return Err(WavGateError::Io(e));
            }
        };

        // Block until the source open is confirmed.
        match open_rx.recv() {
            Ok(Ok(rate)) => {
                *worker = Some(handle);
                *self.control_tx.lock() = Some(control_tx);
                info!(source_rate = ?rate, "engine started — listening");
                Ok(deliveries)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.set_status(EngineStatus::Error);
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the factory panicked.
                let _ = handle.join();
                self.set_status(EngineStatus::Error);
                Err(WavGateError::WorkerPanicked)
            }
        }
    }

    /// Ask for a snapshot of the in-progress segment.
    ///
    /// # Errors
    /// `NotRunning` when no session is accepting controls.
    pub fn ask(&self) -> Result<()> {
        self.send_control(Control::Ask)
    }

    /// Ask the worker to flush and exit. Returns immediately; use `join()`
    /// to wait for the worker.
    pub fn stop(&self) -> Result<()> {
        self.send_control(Control::Stop)?;
        info!("engine stop requested");
        Ok(())
    }

    /// Wait for the worker to exit and report how the session ended.
    ///
    /// # Errors
    /// - `NotRunning` if no session was started.
    /// - `WorkerPanicked` if the worker panicked.
    /// - The error that ended the session.
    pub fn join(&self) -> Result<SessionEnd> {
        let handle = self.worker.lock().take().ok_or(WavGateError::NotRunning)?;
        self.control_tx.lock().take();
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                self.set_status(EngineStatus::Error);
                Err(WavGateError::WorkerPanicked)
            }
        }
    }

    /// Whether a worker is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn send_control(&self, control: Control) -> Result<()> {
        let guard = self.control_tx.lock();
        let tx = guard.as_ref().ok_or(WavGateError::NotRunning)?;
        tx.send(control).map_err(|_| WavGateError::NotRunning)
    }

    fn debug_tap(&self, deliveries: &mut Deliveries) -> Result<Option<DebugTap>> {
        let mut tap = DebugTap::new();
        if self.config.debug_files {
            fs::create_dir_all(&self.config.debug_dir)?;
            let (tx, rx) = bounded(self.config.delivery_capacity);
            tap = tap.with_files(self.config.debug_dir.clone(), tx);
            deliveries.debug_files = Some(rx);
        }
        if self.config.debug_samples {
            let (tx, rx) = bounded(self.config.delivery_capacity);
            tap = tap.with_samples(tx);
            deliveries.debug_samples = Some(rx);
        }
        if tap.is_empty() {
            return Ok(None);
        }
        warn!(
            files = self.config.debug_files,
            samples = self.config.debug_samples,
            "debug outputs enabled"
        );
        Ok(Some(tap))
    }

    fn set_status(&self, new_status: EngineStatus) {
        *self.status.lock() = new_status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{block::Frame, BLOCK_FRAMES};
    use crate::delivery::SegmentKind;
    use crate::source::{ChannelSource, MemorySource};

    fn mono_config() -> EncoderConfig {
        EncoderConfig {
            channels: 1,
            gate: GateConfig {
                wakeup_timeout: 2,
                ..GateConfig::default()
            },
            ..EncoderConfig::default()
        }
    }

    fn frames(amplitude: f64, blocks: usize) -> Vec<Frame> {
        vec![[amplitude, amplitude]; blocks * BLOCK_FRAMES]
    }

    #[test]
    fn new_rejects_bad_format() {
        let config = EncoderConfig {
            precision: 0,
            ..EncoderConfig::default()
        };
        assert!(matches!(
            WavGateEngine::new(config),
            Err(WavGateError::InvalidFormat(_))
        ));
    }

    #[test]
    fn new_rejects_zero_capacity() {
        let config = EncoderConfig {
            delivery_capacity: 0,
            ..EncoderConfig::default()
        };
        assert!(matches!(
            WavGateEngine::new(config),
            Err(WavGateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn capture_stall_timeout_is_configurable_but_not_zero() {
        let config: EncoderConfig =
            serde_json::from_str(r#"{"captureStallTimeoutMs":250}"#).unwrap();
        assert_eq!(config.capture_stall_timeout(), Duration::from_millis(250));
        assert_eq!(
            EncoderConfig::default().capture_stall_timeout(),
            Duration::from_secs(2)
        );

        let config = EncoderConfig {
            capture_stall_timeout_ms: 0,
            ..EncoderConfig::default()
        };
        assert!(matches!(
            WavGateEngine::new(config),
            Err(WavGateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_deserializes_partial_json_with_defaults() {
        let config: EncoderConfig =
            serde_json::from_str(r#"{"channels":1,"gate":{"wakeupTimeout":7}}"#).unwrap();
        assert_eq!(config.channels, 1);
        assert_eq!(config.precision, 2);
        assert_eq!(config.gate.wakeup_timeout, 7);
        assert_eq!(config.gate.fake_break_limit, 2);
        assert_eq!(config.delivery_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn session_runs_to_exhaustion() {
        let engine = WavGateEngine::new(mono_config()).unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);

        let mut audio = frames(0.0, 2);
        audio.extend(frames(0.5, 3));
        audio.extend(frames(0.0, 5));
        let deliveries = engine.start(MemorySource::new(audio)).unwrap();

        assert_eq!(engine.join().unwrap(), SessionEnd::Exhausted);
        assert_eq!(engine.status(), EngineStatus::Stopped);

        let segment = deliveries.segments.try_recv().unwrap();
        assert_eq!(segment.kind, SegmentKind::Complete);
        // 2 pre-roll + 3 loud + 3 silent (the third exceeds the timeout).
        assert_eq!(segment.payload_len(), 8 * BLOCK_FRAMES * 2);
        assert_eq!(engine.diagnostics_snapshot().segments_published, 1);
    }

    #[test]
    fn stop_flushes_and_ends_session() {
        let engine = WavGateEngine::new(mono_config()).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(0);
        let deliveries = engine.start(ChannelSource::new(rx, None)).unwrap();

        for _ in 0..4 {
            tx.send(frames(0.5, 1)).unwrap();
        }
        engine.stop().unwrap();
        // Either Stop is seen before the 5th pull, or that pull ends the
        // stream; both paths flush exactly the four blocks.
        drop(tx);

        let end = engine.join().unwrap();
        assert!(matches!(end, SessionEnd::Stopped | SessionEnd::Exhausted));
        assert_eq!(engine.status(), EngineStatus::Stopped);
        let segment = deliveries.segments.try_recv().unwrap();
        assert_eq!(segment.kind, SegmentKind::Flush);
        assert_eq!(segment.payload_len(), 4 * BLOCK_FRAMES * 2);
        assert_eq!(engine.diagnostics_snapshot().blocks_pulled, 4);
        assert!(deliveries.segments.try_recv().is_err());
    }

    #[test]
    fn second_start_while_running_fails() {
        let engine = WavGateEngine::new(mono_config()).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded::<Vec<Frame>>();
        let _deliveries = engine.start(ChannelSource::new(rx, None)).unwrap();

        assert!(matches!(
            engine.start(MemorySource::default()),
            Err(WavGateError::AlreadyRunning)
        ));

        drop(tx);
        assert_eq!(engine.join().unwrap(), SessionEnd::Exhausted);
    }

    #[test]
    fn open_failure_is_reported_by_start() {
        let engine = WavGateEngine::new(mono_config()).unwrap();
        let err = engine
            .start_with(|| -> Result<MemorySource> {
                Err(WavGateError::NoDefaultInputDevice)
            })
            .unwrap_err();
        assert!(matches!(err, WavGateError::NoDefaultInputDevice));
        assert_eq!(engine.status(), EngineStatus::Error);
        assert!(!engine.is_running());
    }

    #[test]
    fn controls_without_session_are_rejected() {
        let engine = WavGateEngine::new(mono_config()).unwrap();
        assert!(matches!(engine.ask(), Err(WavGateError::NotRunning)));
        assert!(matches!(engine.stop(), Err(WavGateError::NotRunning)));
        assert!(matches!(engine.join(), Err(WavGateError::NotRunning)));
    }

    #[test]
    fn debug_samples_channel_is_wired() {
        let config = EncoderConfig {
            debug_samples: true,
            ..mono_config()
        };
        let engine = WavGateEngine::new(config).unwrap();
        let mut audio = frames(0.5, 3);
        audio.extend(frames(0.0, 3));
        let deliveries = engine.start(MemorySource::new(audio)).unwrap();
        engine.join().unwrap();

        let blocks = deliveries.debug_samples.unwrap().try_recv().unwrap();
        assert_eq!(blocks.len(), 6);
        assert!(deliveries.debug_files.is_none());
    }
}
