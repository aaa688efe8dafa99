//! Session configuration.
//!
//! An [`EngineSimConfig`] fixes the audio format, ring sizes and synthesis
//! mix of a session. It is checked by [`validate`] before any session
//! resources are allocated and never changes afterwards.
//!
//! Configurations can be written by hand or loaded from YAML:
//!
//! ```yaml
//! sample_rate: 48000
//! audio_buffer_size: 24000
//! target_synthesizer_latency: 0.02
//! volume: 0.8
//! ```
//!
//! Missing keys take their default values.

mod validate;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineSimError, Result};

pub use validate::{bound_for, validate};

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Tunable parameters of a simulator session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSimConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Capacity of the simulation-to-synthesizer ring, in samples
    pub input_buffer_size: u32,
    /// Capacity of the synthesized output ring, in frames
    pub audio_buffer_size: u32,
    /// Physics steps per simulated second
    pub simulation_frequency: u32,
    /// Gas-dynamics substeps per physics step
    pub fluid_simulation_steps: u32,
    /// Amount of synthesized audio to keep queued ahead of the device, in seconds
    pub target_synthesizer_latency: f64,
    /// Output gain
    pub volume: f32,
    /// Wet mix of the exhaust impulse response
    pub convolution_level: f32,
    /// Level of broadband noise added to the exhaust flow
    pub air_noise: f32,
}

impl Default for EngineSimConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            input_buffer_size: 1024,
            audio_buffer_size: 96000,
            simulation_frequency: 10000,
            fluid_simulation_steps: 8,
            target_synthesizer_latency: 0.05,
            volume: 1.0,
            convolution_level: 0.5,
            air_noise: 0.1,
        }
    }
}

impl EngineSimConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration tuned for short device buffers.
    ///
    /// The output ring is kept at its minimum of half a second and the
    /// synthesizer only runs 20 ms ahead of the device.
    pub fn low_latency() -> Self {
        Self {
            input_buffer_size: 512,
            audio_buffer_size: DEFAULT_SAMPLE_RATE / 2,
            target_synthesizer_latency: 0.02,
            ..Self::default()
        }
    }

    /// Configuration with a finer simulation and 96 kHz output.
    pub fn high_quality() -> Self {
        Self {
            sample_rate: 96000,
            input_buffer_size: 2048,
            audio_buffer_size: 192000,
            simulation_frequency: 20000,
            fluid_simulation_steps: 16,
            ..Self::default()
        }
    }

    /// Set the output sample rate, keeping the output ring at least half a
    /// second long.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self.audio_buffer_size = self.audio_buffer_size.max(sample_rate.div_ceil(2));
        self
    }

    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("Loading configuration from {:?}", path);

        let contents =
            std::fs::read_to_string(path).map_err(|e| EngineSimError::ConfigFile {
                path: path.to_path_buf(),
                source: e,
            })?;

        serde_yaml::from_str(&contents).map_err(|e| EngineSimError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Number of frames the synthesizer tries to keep queued.
    pub fn target_latency_frames(&self) -> usize {
        (self.target_synthesizer_latency * self.sample_rate as f64).round() as usize
    }
}
