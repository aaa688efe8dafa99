//! Configuration validation.

use crate::error::{Bound, ConfigError, ConfigField, ConfigViolation};

use super::EngineSimConfig;

/// Largest accepted output ring, in frames.
const MAX_AUDIO_BUFFER_SIZE: f64 = 1_048_576.0;

/// Longest accepted synthesizer lead, in seconds.
const MAX_TARGET_LATENCY: f64 = 1.0;

/// The documented range of a configuration field.
///
/// `audio_buffer_size` and `target_synthesizer_latency` depend on the sample
/// rate (and the ring size), so the range is computed against `config`.
/// Returns `None` for fields that are arguments rather than configuration.
pub fn bound_for(field: ConfigField, config: &EngineSimConfig) -> Option<Bound> {
    let sample_rate = config.sample_rate.max(1) as f64;

    let bound = match field {
        ConfigField::SampleRate => Bound::new(8000.0, 192000.0),
        ConfigField::InputBufferSize => Bound::new(64.0, 65536.0),
        ConfigField::AudioBufferSize => {
            Bound::new((sample_rate / 2.0).ceil(), MAX_AUDIO_BUFFER_SIZE)
        }
        ConfigField::SimulationFrequency => Bound::new(1000.0, 100000.0),
        ConfigField::FluidSimulationSteps => Bound::new(1.0, 64.0),
        ConfigField::TargetSynthesizerLatency => Bound::new(
            0.001,
            MAX_TARGET_LATENCY.min(config.audio_buffer_size as f64 / sample_rate),
        ),
        ConfigField::Volume => Bound::new(0.0, 2.0),
        ConfigField::ConvolutionLevel => Bound::new(0.0, 1.0),
        ConfigField::AirNoise => Bound::new(0.0, 1.0),
        ConfigField::Throttle
        | ConfigField::TimeStep
        | ConfigField::BufferCount
        | ConfigField::BufferFrames
        | ConfigField::TickRate => return None,
    };

    Some(bound)
}

/// Validate a configuration before creating a session.
///
/// Every field is checked independently and all violations are reported
/// together.
pub fn validate(config: &EngineSimConfig) -> Result<(), ConfigError> {
    let values = [
        (ConfigField::SampleRate, config.sample_rate as f64),
        (ConfigField::InputBufferSize, config.input_buffer_size as f64),
        (ConfigField::AudioBufferSize, config.audio_buffer_size as f64),
        (ConfigField::SimulationFrequency, config.simulation_frequency as f64),
        (ConfigField::FluidSimulationSteps, config.fluid_simulation_steps as f64),
        (ConfigField::TargetSynthesizerLatency, config.target_synthesizer_latency),
        (ConfigField::Volume, config.volume as f64),
        (ConfigField::ConvolutionLevel, config.convolution_level as f64),
        (ConfigField::AirNoise, config.air_noise as f64),
    ];

    let violations: Vec<ConfigViolation> = values
        .into_iter()
        .filter_map(|(field, value)| {
            let bound = bound_for(field, config)?;
            (!bound.contains(value)).then_some(ConfigViolation {
                field,
                bound,
                value,
            })
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::new(violations))
    }
}
