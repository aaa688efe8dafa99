//! Engine-Sim - real-time engine sound from the command line
//!
//! Runs an engine descriptor through a simulator session and plays the
//! exhaust as raw PCM on stdout, paced like a sound card would pull it.
//!
//! # Usage
//!
//! ```bash
//! enginesim engine.yaml --throttle 0.8 --ramp 3 --duration 10 | ffplay -f f32le -ac 2 -ar 48000 -
//! ```

use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use env_logger::{Builder, Env};
use enginesim_core::{
    audio::{AudioOutput, PacedDevice},
    error::Result,
    AudioRenderBridge, BufferPool, ClockConfig, EngineSimConfig, Session, SimulationClock,
};

/// Interval at which the throttle ramp is advanced.
const CONTROL_INTERVAL: Duration = Duration::from_millis(20);

/// Real-time engine sound simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine descriptor (.yaml)
    #[arg(value_name = "ENGINE_FILE")]
    engine_file: PathBuf,

    /// Session configuration file (.yaml); missing fields use defaults
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start from the low-latency preset
    #[arg(long, conflicts_with = "config")]
    low_latency: bool,

    /// Output sample rate in Hz
    #[arg(short, long)]
    sample_rate: Option<u32>,

    /// Throttle position to settle at, 0.0 to 1.0
    #[arg(short, long, default_value_t = 0.3)]
    throttle: f64,

    /// Seconds to ramp the throttle from closed to its target
    #[arg(long, default_value_t = 0.0)]
    ramp: f64,

    /// Seconds to run; runs until the output closes if omitted
    #[arg(short, long)]
    duration: Option<f64>,

    /// Frames per hardware buffer
    #[arg(long, default_value_t = 256)]
    buffer_frames: usize,

    /// Hardware buffers in the pool
    #[arg(long, default_value_t = 3)]
    buffers: usize,

    /// Simulation clock rate in Hz
    #[arg(long, default_value_t = 120.0)]
    tick_rate: f64,
}

impl Args {
    fn session_config(&self) -> Result<EngineSimConfig> {
        let config = match &self.config {
            Some(path) => EngineSimConfig::load(path)?,
            None if self.low_latency => EngineSimConfig::low_latency(),
            None => EngineSimConfig::default(),
        };

        Ok(match self.sample_rate {
            Some(rate) => config.with_sample_rate(rate),
            None => config,
        })
    }

    /// Throttle position `elapsed` into the run.
    fn throttle_at(&self, elapsed: Duration) -> f64 {
        if self.ramp <= 0.0 {
            return self.throttle;
        }
        self.throttle * (elapsed.as_secs_f64() / self.ramp).min(1.0)
    }
}

fn main() -> Result<()> {
    // stdout carries audio, so logs go to stderr
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();
    log::info!("enginesim {}", enginesim_core::version());

    let config = args.session_config()?;
    let session = Session::create(config)?;

    let result = run(&args, &session);

    let stats = session.stats();
    session.destroy()?;
    if let Ok(stats) = stats {
        log::info!(
            "Finished at {:.0} rpm after {} updates ({} underruns, {} render faults)",
            stats.rpm,
            stats.updates,
            stats.underruns,
            stats.render_faults
        );
    }
    result
}

fn run(args: &Args, session: &Session) -> Result<()> {
    session.load_script(&args.engine_file)?;
    session.start_audio_thread()?;
    session.set_throttle(args.throttle_at(Duration::ZERO))?;

    let mut clock = SimulationClock::start(
        session.clone(),
        ClockConfig::default().with_tick_rate(args.tick_rate),
    )?;

    let pool = BufferPool::new(args.buffers, args.buffer_frames)?;
    let output = AudioOutput::new(io::stdout(), args.buffer_frames);
    let mut device = PacedDevice::start(
        AudioRenderBridge::new(session.clone()),
        pool,
        output,
        session.config().sample_rate,
    )?;

    let started = Instant::now();
    let duration = args.duration.map(Duration::from_secs_f64);
    while device.is_running() && clock.is_running() {
        let elapsed = started.elapsed();
        if duration.is_some_and(|d| elapsed >= d) {
            break;
        }
        session.set_throttle(args.throttle_at(elapsed))?;
        thread::sleep(CONTROL_INTERVAL);
    }

    clock.stop();
    device.stop()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_args_parse_and_ramp() {
        let args = Args::parse_from(["enginesim", "v8.yaml", "--throttle", "0.8", "--ramp", "2"]);
        assert_eq!(args.engine_file, PathBuf::from("v8.yaml"));
        assert_eq!(args.buffers, 3);
        assert_relative_eq!(args.throttle_at(Duration::ZERO), 0.0);
        assert_relative_eq!(args.throttle_at(Duration::from_secs(1)), 0.4);
        assert_relative_eq!(args.throttle_at(Duration::from_secs(5)), 0.8);
    }

    #[test]
    fn test_session_config_overrides() {
        let args = Args::parse_from(["enginesim", "e.yaml", "--low-latency", "--sample-rate", "96000"]);
        let config = args.session_config().unwrap();
        assert_eq!(config.sample_rate, 96_000);
        assert_eq!(config.input_buffer_size, EngineSimConfig::low_latency().input_buffer_size);
        assert!(config.audio_buffer_size >= 48_000);
    }
}
