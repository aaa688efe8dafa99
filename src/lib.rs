//! # Engine-Sim Core
//!
//! A real-time bridge between an engine simulation loop and a hardware audio
//! callback.
//!
//! This library provides:
//! - Sessions that own one engine simulation and its exhaust synthesizer
//! - A lock-free render path safe to call from an audio driver callback
//! - A fixed-rate simulation clock with step clamping
//! - A preallocated buffer pool for the hardware side
//! - Configuration validation with per-field error reporting
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Session configuration, presets, YAML loading and validation
//! - [`session`] - The simulator session and its lifecycle
//! - [`engine`] - The engine collaborator interface and a procedural engine
//! - [`synth`] - Exhaust synthesizer and the rings around it
//! - [`clock`] - Periodic driver for `update`
//! - [`bridge`] - Buffer pool and render bridge for the audio device
//! - [`control`] - Atomic throttle channel
//! - [`stats`] - Lock-free statistics
//! - [`audio`] - Paced PCM output (CLI only)
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! enginesim engine.yaml --throttle 0.6 | ffplay -f f32le -ac 2 -ar 48000 -
//! ```
//!
//! ### Library
//!
//! ```no_run
//! use enginesim_core::{AudioRenderBridge, ClockConfig, EngineSimConfig, Session, SimulationClock};
//!
//! # fn main() -> enginesim_core::Result<()> {
//! let session = Session::create(EngineSimConfig::low_latency())?;
//! session.load_script("engine.yaml")?;
//! session.start_audio_thread()?;
//!
//! let _clock = SimulationClock::start(session.clone(), ClockConfig::default())?;
//! let bridge = AudioRenderBridge::new(session.clone());
//!
//! // From the audio callback
//! let mut buffer = [0.0f32; 256 * 2];
//! bridge.fill(&mut buffer);
//!
//! // From the input thread
//! session.set_throttle(0.4)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading Model
//!
//! Three actors share a session without a common clock:
//!
//! 1. The simulation actor calls `update` at roughly 120 Hz
//! 2. The audio actor calls `render` at the device's buffer cadence
//! 3. The input actor calls `set_throttle` whenever the user moves
//!
//! They meet only at atomics and wait-free single-producer single-consumer
//! rings. The render path never blocks, allocates or logs.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod session;
pub mod stats;
pub mod synth;

#[cfg(feature = "cli")]
pub mod audio;

// Re-export main types for convenience
pub use bridge::{AudioRenderBridge, BufferPool};
pub use clock::{ClockAction, ClockConfig, SimulationClock};
pub use config::EngineSimConfig;
pub use error::{EngineSimError, Result};
pub use session::{Session, SessionState, MAX_TIME_STEP};
pub use stats::StatsSnapshot;

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = config::DEFAULT_SAMPLE_RATE;

/// Version of the bridge library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
