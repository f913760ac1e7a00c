use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, thread, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

use free_queue::config::SessionConfig;
use free_queue::dsp::oscillator::ToneGenerator;
use free_queue::host::{CpalHost, QuantumDriver, SimulatedHost, list_audio_devices};
use free_queue::render::{Gain, RenderCoordinator, StreamStats};

/// Sample rate of the simulated host
const SIMULATED_SAMPLE_RATE: u32 = 48000;

/// Streams a test tone through a lock-free worker render loop
#[derive(Parser, Debug)]
#[command(name = "free-queue")]
#[command(about = "Lock-free ring buffer render loop demo", long_about = None)]
struct Args {
    /// Configuration file (YAML); defaults apply when omitted
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// List available devices and exit
    #[arg(short = 'l', long = "list")]
    list_devices: bool,

    /// Drive the session from a simulated clock instead of an audio device
    #[arg(long)]
    simulate: bool,

    /// Seconds to stream before tearing down
    #[arg(short = 'd', long = "duration", default_value_t = 5.0)]
    duration: f64,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(serde::Serialize)]
struct Report {
    peak: f32,
    stats: StreamStats,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_devices {
        println!("Available Audio Output Devices:");
        for (i, device) in list_audio_devices()?.iter().enumerate() {
            println!("  {}: {}", i, device);
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    let duration = Duration::try_from_secs_f64(args.duration.max(0.0))
        .context("Invalid duration")?;

    let report = run_session(&config, args.simulate, duration)?;
    print!("{}", serde_yaml::to_string(&report)?);
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Bring a session up, stream for `duration`, then tear it down
fn run_session(config: &SessionConfig, simulate: bool, duration: Duration) -> Result<Report> {
    let (mut coordinator, processor) =
        RenderCoordinator::spawn(Gain::new(config.kernel.gain), config.session_options())
            .context("Failed to start worker")?;
    let channels = config.stream.channels;

    let peak = if simulate {
        coordinator
            .initialize(config.init_message())
            .context("Worker setup failed")?;
        let tone = tone_for(config, SIMULATED_SAMPLE_RATE);
        let driver = QuantumDriver::new(processor, tone, channels)?;
        let meter = driver.meter();

        let host = SimulatedHost::start(driver, SIMULATED_SAMPLE_RATE)?;
        info!(seconds = duration.as_secs_f64(), "streaming (simulated)");
        thread::sleep(duration);

        // The clock must stop calling into the rings before teardown
        if let Some(mut driver) = host.stop() {
            driver.stop();
        }
        meter.peak()
    } else {
        let host = CpalHost::open(&config.device.audioout)?;
        coordinator
            .initialize(config.init_message())
            .context("Worker setup failed")?;
        let tone = tone_for(config, host.sample_rate());
        let driver = QuantumDriver::new(processor, tone, channels)?;
        let meter = driver.meter();

        let stream = host.start(driver)?;
        info!(
            device = host.name(),
            seconds = duration.as_secs_f64(),
            "streaming"
        );
        thread::sleep(duration);

        drop(stream);
        meter.peak()
    };

    let stats = coordinator.shutdown().context("Teardown failed")?;
    Ok(Report { peak, stats })
}

fn tone_for(config: &SessionConfig, sample_rate: u32) -> ToneGenerator {
    ToneGenerator::new(
        sample_rate as f32,
        config.source.frequency,
        config.source.amplitude,
        config.source.wave,
    )
}
