use anyhow::{bail, Context, Result};
use image::Rgba;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use game_bot_vision::{
    AsyncDetector, DetectionError, Detector, FrameImage, PipelineConfig, PipelineEvent,
};

const FRAME_WIDTH: u32 = 160;
const FRAME_HEIGHT: u32 = 90;
const STATS_EVERY_FRAMES: u64 = 100;

/// Object reported by the simulated detector
#[derive(Debug, Clone, Serialize)]
struct SimulatedObject {
    id: u64,
    x: u32,
    y: u32,
    confidence: f32,
}

/// Stand-in for a real model: sleeps for a jittered latency and fails at a
/// configurable rate.
struct SimulatedDetector {
    rng: StdRng,
    latency_ms: f64,
    failure_rate: f64,
    calls: u64,
}

impl SimulatedDetector {
    fn new(latency_ms: f64, failure_rate: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            latency_ms,
            failure_rate,
            calls: 0,
        }
    }
}

impl Detector<SimulatedObject> for SimulatedDetector {
    fn detect(&mut self, image: &FrameImage) -> Result<Vec<SimulatedObject>, DetectionError> {
        self.calls += 1;
        let jitter = self.rng.gen_range(0.5..1.5);
        thread::sleep(Duration::from_secs_f64(self.latency_ms * jitter / 1000.0));

        if self.rng.gen_bool(self.failure_rate) {
            return Err(DetectionError::failed(format!(
                "simulated inference failure on call {}",
                self.calls
            )));
        }

        let count = self.rng.gen_range(0..4);
        Ok((0..count)
            .map(|i| SimulatedObject {
                id: self.calls * 10 + i,
                x: self.rng.gen_range(0..image.width()),
                y: self.rng.gen_range(0..image.height()),
                confidence: self.rng.gen_range(0.25..1.0),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct Args {
    config: Option<PathBuf>,
    frames: u64,
    fps: f64,
    latency_ms: f64,
    failure_rate: f64,
    test: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            frames: 600,
            fps: 60.0,
            latency_ms: 40.0,
            failure_rate: 0.0,
            test: false,
        }
    }
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--test" => args.test = true,
            "--config" => args.config = Some(PathBuf::from(next_value(&mut iter, &flag)?)),
            "--frames" => {
                args.frames = next_value(&mut iter, &flag)?
                    .parse()
                    .context("--frames expects an integer")?
            }
            "--fps" => {
                args.fps = next_value(&mut iter, &flag)?
                    .parse()
                    .context("--fps expects a number")?
            }
            "--latency-ms" => {
                args.latency_ms = next_value(&mut iter, &flag)?
                    .parse()
                    .context("--latency-ms expects a number")?
            }
            "--failure-rate" => {
                args.failure_rate = next_value(&mut iter, &flag)?
                    .parse()
                    .context("--failure-rate expects a number between 0 and 1")?
            }
            other => bail!("Unknown argument: {other}"),
        }
    }

    args.validate()?;
    Ok(args)
}

impl Args {
    fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            bail!("--fps must be a positive number, got {}", self.fps);
        }
        if !self.latency_ms.is_finite() || self.latency_ms < 0.0 {
            bail!("--latency-ms must be a non-negative number, got {}", self.latency_ms);
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            bail!("--failure-rate must be between 0 and 1, got {}", self.failure_rate);
        }
        Ok(())
    }
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    iter.next()
        .with_context(|| format!("{flag} requires a value"))
}

fn main() -> Result<()> {
    initialize_tracing();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    println!("===========================================");
    println!("  Game Bot Vision - Async Detection Bench");
    println!("===========================================\n");

    if args.test {
        run_tests(&config, &args)
    } else {
        run_benchmark(config, &args)
    }
}

fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("GameBotVision").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "game-bot-vision.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!("Log directory: {}", log_dir.display());
}

/// Synthetic frame whose content changes with `index`
fn synthetic_frame(index: u64) -> FrameImage {
    let shift = (index % 256) as u8;
    FrameImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
        Rgba([
            (x as u8).wrapping_add(shift),
            (y as u8).wrapping_add(shift),
            shift,
            255,
        ])
    })
}

fn run_benchmark(config: PipelineConfig, args: &Args) -> Result<()> {
    tracing::info!(
        frames = args.frames,
        fps = args.fps,
        latency_ms = args.latency_ms,
        failure_rate = args.failure_rate,
        "Starting benchmark"
    );

    let detector = AsyncDetector::<SimulatedObject>::with_detector(
        SimulatedDetector::new(args.latency_ms, args.failure_rate),
        config,
    )
    .context("Invalid pipeline configuration")?;
    let (events, _subscription) = detector.subscribe();

    let frame_period = Duration::from_secs_f64(1.0 / args.fps);
    let mut stale_reads = 0u64;

    {
        let session = detector.session();
        if !session.started() {
            bail!("Detection pipeline failed to start");
        }

        for index in 1..=args.frames {
            let frame_started = Instant::now();
            session.submit_frame(&synthetic_frame(index));

            if session.get_fresh_result().is_none() {
                stale_reads += 1;
            }

            for event in events.try_iter() {
                if let PipelineEvent::FallbackEngaged { .. } = event {
                    tracing::warn!("{}", event.description());
                }
            }

            if index % STATS_EVERY_FRAMES == 0 {
                let stats = session.get_stats();
                tracing::info!(
                    frame = index,
                    detections = stats.detection_count,
                    mean_ms = stats.mean_latency_ms,
                    queue_depth = stats.queue_depth,
                    overflows = stats.overflow_count,
                    mode = stats.mode.label(),
                    "Progress"
                );
            }

            if let Some(remaining) = frame_period.checked_sub(frame_started.elapsed()) {
                thread::sleep(remaining);
            }
        }
    }

    let stats = detector.get_stats();
    stats.log_report();
    tracing::info!(stale_reads, "Reads without a fresh result");

    let json = serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?;
    println!("{json}");
    Ok(())
}

fn run_tests(config: &PipelineConfig, args: &Args) -> Result<()> {
    println!("Running in TEST mode\n");

    test_config(config)?;
    test_force_refresh(config, args)?;
    test_lifecycle(config, args)?;

    println!("\n✓ All tests completed!");
    Ok(())
}

fn test_config(config: &PipelineConfig) -> Result<()> {
    println!("=== Config Test ===");
    println!("{}", config.to_json_pretty().context("Failed to serialize config")?);
    config.validate().context("Configuration is invalid")?;
    println!("✓ Configuration valid\n");
    Ok(())
}

fn test_force_refresh(config: &PipelineConfig, args: &Args) -> Result<()> {
    println!("=== Synchronous Detection Test ===");
    let detector = AsyncDetector::<SimulatedObject>::with_detector(
        SimulatedDetector::new(args.latency_ms, 0.0),
        config.clone(),
    )?;

    let results = detector.force_refresh(&synthetic_frame(1));
    let stats = detector.get_stats();
    println!(
        "✓ force_refresh returned {} objects in {:.2} ms",
        results.len(),
        stats.mean_latency_ms
    );
    if stats.detection_count != 1 {
        bail!("expected one recorded detection, got {}", stats.detection_count);
    }
    println!();
    Ok(())
}

fn test_lifecycle(config: &PipelineConfig, args: &Args) -> Result<()> {
    println!("=== Lifecycle Test ===");
    let detector = AsyncDetector::<SimulatedObject>::with_detector(
        SimulatedDetector::new(args.latency_ms, 0.0),
        config.clone(),
    )?;

    if !detector.start() {
        bail!("start() returned false");
    }
    println!("✓ Started ({})", detector.state().description());

    let interval = config.effective_interval();
    for index in 1..=interval * 3 {
        detector.submit_frame(&synthetic_frame(index));
    }
    thread::sleep(Duration::from_millis((args.latency_ms * 4.0) as u64));

    let stopped_at = Instant::now();
    if !detector.stop(config.stop_timeout()) {
        bail!("worker did not stop within {:?}", config.stop_timeout());
    }
    println!(
        "✓ Stopped in {:.1} ms, {} detections",
        stopped_at.elapsed().as_secs_f64() * 1000.0,
        detector.get_stats().detection_count
    );
    Ok(())
}
