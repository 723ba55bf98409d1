//! wavgate command-line host.
//!
//! ```text
//! wavgate [--config <settings.json>] [--input <file.wav>] [--out <dir>] [--device <name>]
//! ```
//!
//! Without `--input` the default (or named) microphone is captured until
//! `stop` or EOF arrives on stdin; `ask` requests a snapshot of the segment
//! being recorded. Every published segment becomes one WAV file.

mod file_source;
mod settings;
mod writer;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{never, select};
use tracing::{debug, info, warn};
use wavgate_core::{Deliveries, WavGateEngine, WavGateError};

use file_source::WavFileSource;
use settings::{default_settings_path, load_settings};
use writer::SegmentWriter;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
    out: Option<PathBuf>,
    device: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| {
            it.next()
                .with_context(|| format!("missing value for {name}"))
        };
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--input" => args.input = Some(PathBuf::from(value("--input")?)),
            "--out" => args.out = Some(PathBuf::from(value("--out")?)),
            "--device" => args.device = Some(value("--device")?),
            "--help" | "-h" => {
                println!(
                    "Usage: wavgate [--config <settings.json>] [--input <file.wav>] \
                     [--out <dir>] [--device <name>]\n\n\
                     stdin commands while capturing: ask, stop (EOF also stops)"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

/// Forward stdin commands to the engine until `stop` or EOF.
fn spawn_stdin_control(engine: Arc<WavGateEngine>) -> Result<()> {
    thread::Builder::new()
        .name("wavgate-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "ask" => {
                        if let Err(e) = engine.ask() {
                            warn!("ask failed: {e}");
                        }
                    }
                    "stop" => break,
                    "" => {}
                    other => warn!(command = other, "unknown command (expected ask or stop)"),
                }
            }
            match engine.stop() {
                Ok(()) => {}
                Err(WavGateError::NotRunning) => debug!("session already ended"),
                Err(e) => warn!("stop failed: {e}"),
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(())
}

/// Persist segments until the worker drops its senders.
fn drain(deliveries: Deliveries, writer: &mut SegmentWriter) -> Result<()> {
    let mut debug_files = deliveries.debug_files.unwrap_or_else(never);
    let mut debug_samples = deliveries.debug_samples.unwrap_or_else(never);
    loop {
        select! {
            recv(deliveries.segments) -> segment => match segment {
                Ok(segment) => {
                    writer.write(&segment)?;
                }
                Err(_) => break,
            },
            recv(debug_files) -> name => match name {
                Ok(name) => info!(file = %name, "debug segment file"),
                Err(_) => debug_files = never(),
            },
            recv(debug_samples) -> blocks => match blocks {
                Ok(blocks) => debug!(blocks = blocks.len(), "debug segment samples"),
                Err(_) => debug_samples = never(),
            },
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wavgate=info")),
        )
        .init();

    let args = parse_args()?;
    let settings_path = args.config.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    info!(path = %settings_path.display(), profile = %settings.gate_profile, "settings loaded");
    if let Some(out) = args.out {
        settings.output_dir = out;
    }
    if let Some(device) = args.device {
        settings.preferred_input_device = Some(device);
    }

    let engine = Arc::new(
        WavGateEngine::new(settings.encoder.clone()).context("invalid encoder configuration")?,
    );
    let mut writer = SegmentWriter::create(&settings)?;

    let deliveries = match args.input {
        Some(path) => {
            info!(input = %path.display(), "encoding file input");
            engine
                .start_with(move || WavFileSource::open(&path))
                .context("failed to open input file")?
        }
        None => {
            let deliveries = engine
                .start_capture(settings.preferred_input_device.clone())
                .context("failed to open input device")?;
            info!("listening; type `ask` for a snapshot, `stop` or EOF to finish");
            spawn_stdin_control(Arc::clone(&engine))?;
            deliveries
        }
    };

    drain(deliveries, &mut writer)?;
    let end = engine.join().context("capture session failed")?;

    let d = engine.diagnostics_snapshot();
    info!(
        ?end,
        blocks = d.blocks_pulled,
        onsets = d.onsets,
        published = d.segments_published,
        dropped = d.segments_dropped,
        lost = d.deliveries_dropped,
        files = writer.written(),
        "session finished"
    );
    Ok(())
}
