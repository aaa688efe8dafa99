//! Error types for the engine-sim bridge.
//!
//! This module provides a unified error type [`EngineSimError`] over the
//! four error families a caller can observe: configuration, handle state,
//! script loading and runtime faults. Every family is also usable on its own
//! so that hot paths can return the narrow type without allocating.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`EngineSimError`].
pub type Result<T> = std::result::Result<T, EngineSimError>;

/// Unified error type for all engine-sim operations.
#[derive(Error, Debug)]
pub enum EngineSimError {
    // ============ Caller-facing families ============
    /// One or more configuration values are out of range
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The session is in the wrong state for the requested operation
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// The engine description could not be loaded
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The simulation or renderer faulted
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    // ============ Configuration files ============
    /// Error reading a configuration file
    #[error("Failed to read config file '{path}': {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a configuration file
    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    // ============ Threads and I/O ============
    /// A worker thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Error writing rendered audio to the output sink
    #[error("Audio output error: {message}")]
    AudioOutput { message: String },
}

impl EngineSimError {
    /// The handle error carried by this error, if any.
    pub fn as_handle_error(&self) -> Option<HandleError> {
        match self {
            Self::Handle(e) => Some(*e),
            _ => None,
        }
    }
}

/// A tunable value that can be rejected by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    SampleRate,
    InputBufferSize,
    AudioBufferSize,
    SimulationFrequency,
    FluidSimulationSteps,
    TargetSynthesizerLatency,
    Volume,
    ConvolutionLevel,
    AirNoise,
    /// Throttle position passed to `set_throttle`
    Throttle,
    /// Time step passed to `update`
    TimeStep,
    /// Buffers in a hardware buffer pool
    BufferCount,
    /// Frames per hardware buffer
    BufferFrames,
    /// Rate of the simulation clock
    TickRate,
}

impl ConfigField {
    /// The field name as it appears in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SampleRate => "sample_rate",
            Self::InputBufferSize => "input_buffer_size",
            Self::AudioBufferSize => "audio_buffer_size",
            Self::SimulationFrequency => "simulation_frequency",
            Self::FluidSimulationSteps => "fluid_simulation_steps",
            Self::TargetSynthesizerLatency => "target_synthesizer_latency",
            Self::Volume => "volume",
            Self::ConvolutionLevel => "convolution_level",
            Self::AirNoise => "air_noise",
            Self::Throttle => "throttle",
            Self::TimeStep => "time_step",
            Self::BufferCount => "buffer_count",
            Self::BufferFrames => "buffer_frames",
            Self::TickRate => "tick_rate",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive range a value must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies inside the range. NaN never does.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// A single out-of-range value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigViolation {
    pub field: ConfigField,
    pub bound: Bound,
    pub value: f64,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} is outside {}", self.field, self.value, self.bound)
    }
}

/// Every violation found while checking a configuration or argument.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid configuration: {}", join_violations(.violations))]
pub struct ConfigError {
    violations: Vec<ConfigViolation>,
}

fn join_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    /// Create an error from a non-empty list of violations.
    pub fn new(violations: Vec<ConfigViolation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }

    /// Create an error for a single argument outside its range.
    pub fn out_of_range(field: ConfigField, bound: Bound, value: f64) -> Self {
        Self::new(vec![ConfigViolation {
            field,
            bound,
            value,
        }])
    }

    /// All violations, in field declaration order.
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.violations
    }

    /// The violation for `field`, if that field was rejected.
    pub fn violation(&self, field: ConfigField) -> Option<&ConfigViolation> {
        self.violations.iter().find(|v| v.field == field)
    }

    /// Whether `field` was rejected.
    pub fn names(&self, field: ConfigField) -> bool {
        self.violation(field).is_some()
    }
}

/// Session state errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The session has been destroyed
    #[error("Invalid handle: session has been destroyed")]
    InvalidHandle,

    /// The synthesis thread is already running
    #[error("Audio thread is already running")]
    AlreadyRunning,

    /// No engine description has been loaded yet
    #[error("No engine script loaded")]
    NotLoaded,
}

/// Errors reported by the script collaborator.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The script file does not exist or cannot be opened
    #[error("Engine script '{path}' not found: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The script was read but could not be turned into an engine
    #[error("Engine script '{path}' failed to compile: {message}")]
    CompilationFailed { path: PathBuf, message: String },
}

impl ScriptError {
    /// Create a compilation failure error
    pub fn compilation_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CompilationFailed {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Faults raised while the simulation or renderer is running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The engine model produced an unusable state
    #[error("Simulation update failed: {message}")]
    UpdateFault { message: String },

    /// The renderer could not produce audio for a callback.
    ///
    /// `Session::render` never returns this; it silences the buffer and
    /// counts the fault in `StatsSnapshot::render_faults` instead. The
    /// variant names the fault for callers reporting those counters.
    #[error("Render fault")]
    RenderFault,

    /// `update` was entered while another `update` was still running
    #[error("Concurrent update rejected: update calls must be serialized")]
    ConcurrentUpdate,
}

impl RuntimeError {
    /// Create an update fault error
    pub fn update_fault(message: impl Into<String>) -> Self {
        Self::UpdateFault {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_rejects_nan() {
        let bound = Bound::new(0.0, 1.0);
        assert!(bound.contains(0.0));
        assert!(bound.contains(1.0));
        assert!(!bound.contains(f64::NAN));
        assert!(!bound.contains(1.0001));
    }

    #[test]
    fn test_config_error_message_lists_every_field() {
        let err = ConfigError::new(vec![
            ConfigViolation {
                field: ConfigField::SampleRate,
                bound: Bound::new(8000.0, 192000.0),
                value: 4000.0,
            },
            ConfigViolation {
                field: ConfigField::Volume,
                bound: Bound::new(0.0, 2.0),
                value: 3.0,
            },
        ]);

        let message = err.to_string();
        assert!(message.contains("sample_rate = 4000 is outside [8000, 192000]"));
        assert!(message.contains("volume = 3 is outside [0, 2]"));
        assert!(err.names(ConfigField::Volume));
        assert!(!err.names(ConfigField::AirNoise));
    }

    #[test]
    fn test_handle_error_converts() {
        let err: EngineSimError = HandleError::NotLoaded.into();
        assert_eq!(err.as_handle_error(), Some(HandleError::NotLoaded));
    }
}
