fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use serde::Serialize;
    use std::path::PathBuf;
    use std::time::Instant;
    use wavgate_core::buffering::BLOCK_FRAMES;
    use wavgate_core::{EncoderConfig, Frame, MemorySource, WavGateEngine};

    #[derive(Debug)]
    struct Args {
        seconds: u32,
        iterations: usize,
        channels: u16,
        precision: u16,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct RunResult {
        iteration: usize,
        elapsed_ms: f64,
        realtime_factor: f64,
        segments: usize,
        bytes: usize,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        audio_seconds: u32,
        iterations: usize,
        channels: u16,
        precision: u16,
        p50_elapsed_ms: f64,
        p95_elapsed_ms: f64,
        avg_realtime_factor: f64,
        runs: Vec<RunResult>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut args = Args {
            seconds: 60,
            iterations: 3,
            channels: 2,
            precision: 2,
            output: None,
        };

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            let mut value = |name: &str| {
                it.next()
                    .ok_or_else(|| format!("missing value for {name}"))
            };
            match arg.as_str() {
                "--seconds" => {
                    args.seconds = value("--seconds")?
                        .parse::<u32>()
                        .map_err(|_| "invalid value for --seconds".to_string())?
                        .clamp(1, 3_600);
                }
                "--iterations" => {
                    args.iterations = value("--iterations")?
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --iterations".to_string())?
                        .clamp(1, 50);
                }
                "--channels" => {
                    args.channels = value("--channels")?
                        .parse::<u16>()
                        .map_err(|_| "invalid value for --channels".to_string())?;
                }
                "--precision" => {
                    args.precision = value("--precision")?
                        .parse::<u16>()
                        .map_err(|_| "invalid value for --precision".to_string())?;
                }
                "--output" => {
                    args.output = Some(PathBuf::from(value("--output")?));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p wavgate-core --release --bin benchmark -- \\
  [--seconds <n>] [--iterations <n>] [--channels <n>] [--precision <1-3>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(args)
    }

    /// Alternating 1 s bursts and 1.5 s pauses with a quiet noise floor.
    fn synthetic_audio(sample_rate: u32, seconds: u32) -> Vec<Frame> {
        let total = (sample_rate * seconds) as usize;
        let burst = sample_rate as usize;
        let period = burst * 5 / 2;
        (0..total)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let amplitude = if i % period < burst { 0.4 } else { 0.004 };
                let s = amplitude * (t * 440.0 * std::f64::consts::TAU).sin();
                [s, s * 0.8]
            })
            .collect()
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    let args = parse_args()?;
    let config = EncoderConfig {
        channels: args.channels,
        precision: args.precision,
        delivery_capacity: 1_024,
        ..EncoderConfig::default()
    };
    let engine = WavGateEngine::new(config.clone()).map_err(|e| e.to_string())?;
    let audio = synthetic_audio(config.sample_rate, args.seconds);
    eprintln!(
        "benchmarking {} s of audio ({} blocks), {} iteration(s)",
        args.seconds,
        audio.len().div_ceil(BLOCK_FRAMES),
        args.iterations
    );

    let mut runs = Vec::with_capacity(args.iterations);
    for iteration in 0..args.iterations {
        let started = Instant::now();
        let deliveries = engine
            .start(MemorySource::new(audio.clone()))
            .map_err(|e| e.to_string())?;
        engine.join().map_err(|e| e.to_string())?;
        let elapsed = started.elapsed().as_secs_f64();

        let (segments, bytes) = deliveries
            .segments
            .try_iter()
            .fold((0, 0), |(n, b), s| (n + 1, b + s.payload_len()));
        runs.push(RunResult {
            iteration,
            elapsed_ms: elapsed * 1_000.0,
            realtime_factor: args.seconds as f64 / elapsed.max(f64::EPSILON),
            segments,
            bytes,
        });
    }

    let mut elapsed: Vec<f64> = runs.iter().map(|r| r.elapsed_ms).collect();
    elapsed.sort_by(|a, b| a.total_cmp(b));
    let summary = Summary {
        audio_seconds: args.seconds,
        iterations: args.iterations,
        channels: args.channels,
        precision: args.precision,
        p50_elapsed_ms: percentile(&elapsed, 0.50),
        p95_elapsed_ms: percentile(&elapsed, 0.95),
        avg_realtime_factor: runs.iter().map(|r| r.realtime_factor).sum::<f64>()
            / runs.len() as f64,
        runs,
    };

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    match args.output {
        Some(path) => std::fs::write(&path, json)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
