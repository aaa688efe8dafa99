//! YAML engine descriptors.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::EngineSimConfig;
use crate::error::ScriptError;

use super::{EngineModel, ProceduralEngine, ScriptCompiler};

/// Static description of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineDescriptor {
    /// Display name
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of cylinders, fired evenly over a 720° cycle
    pub cylinders: u32,
    /// Total swept volume in litres
    #[serde(default = "default_displacement")]
    pub displacement_l: f64,
    /// Speed the idle governor holds with the throttle closed
    pub idle_rpm: f64,
    /// Speed at which the rev limiter cuts torque
    pub redline_rpm: f64,
    /// Peak crank torque at full throttle, in newton metres
    #[serde(default = "default_peak_torque")]
    pub peak_torque_nm: f64,
    /// Rotating inertia in kg·m²
    #[serde(default = "default_inertia")]
    pub inertia: f64,
    /// Viscous friction torque per rad/s
    #[serde(default = "default_friction")]
    pub friction: f64,
}

fn default_name() -> String {
    "engine".to_string()
}

fn default_displacement() -> f64 {
    2.0
}

fn default_peak_torque() -> f64 {
    200.0
}

fn default_inertia() -> f64 {
    0.15
}

fn default_friction() -> f64 {
    0.05
}

impl EngineDescriptor {
    /// Parse a descriptor from YAML source.
    pub fn parse(source: &str) -> Result<Self, String> {
        let descriptor: Self = serde_yaml::from_str(source).map_err(|e| e.to_string())?;
        descriptor.check()?;
        Ok(descriptor)
    }

    /// Check the physical plausibility of the descriptor.
    fn check(&self) -> Result<(), String> {
        if !(1..=16).contains(&self.cylinders) {
            return Err(format!("cylinders must be 1..=16, got {}", self.cylinders));
        }
        let positive = [
            ("displacement_l", self.displacement_l),
            ("idle_rpm", self.idle_rpm),
            ("redline_rpm", self.redline_rpm),
            ("peak_torque_nm", self.peak_torque_nm),
            ("inertia", self.inertia),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{name} must be positive, got {value}"));
            }
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(format!("friction must be non-negative, got {}", self.friction));
        }
        if self.redline_rpm <= self.idle_rpm {
            return Err(format!(
                "redline_rpm ({}) must be above idle_rpm ({})",
                self.redline_rpm, self.idle_rpm
            ));
        }
        Ok(())
    }
}

/// Compiles YAML descriptors into [`ProceduralEngine`] models.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorCompiler;

impl ScriptCompiler for DescriptorCompiler {
    fn compile(
        &self,
        path: &Path,
        config: &EngineSimConfig,
    ) -> Result<Box<dyn EngineModel>, ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|e| ScriptError::NotFound {
            path: path.to_path_buf(),
            source: e,
        })?;

        let descriptor = EngineDescriptor::parse(&source)
            .map_err(|message| ScriptError::compilation_failed(path, message))?;

        log::info!(
            "Compiled engine '{}' ({} cylinders, {:.1} L)",
            descriptor.name,
            descriptor.cylinders,
            descriptor.displacement_l
        );

        Ok(Box::new(ProceduralEngine::new(
            descriptor,
            config.fluid_simulation_steps,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const INLINE_FOUR: &str = "name: inline-4\ncylinders: 4\nidle_rpm: 850\nredline_rpm: 6800\n";

    #[test]
    fn test_parse_with_defaults() {
        let descriptor = EngineDescriptor::parse(INLINE_FOUR).unwrap();
        assert_eq!(descriptor.name, "inline-4");
        assert_eq!(descriptor.cylinders, 4);
        assert_eq!(descriptor.displacement_l, 2.0);
        assert_eq!(descriptor.inertia, 0.15);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(EngineDescriptor::parse("cylinders: 0\nidle_rpm: 800\nredline_rpm: 6000\n").is_err());
        assert!(EngineDescriptor::parse("cylinders: 4\nidle_rpm: 7000\nredline_rpm: 6000\n").is_err());
        assert!(EngineDescriptor::parse("cylinders: 4\nidle_rpm: 800\nredline_rpm: 6000\nturbo: yes\n").is_err());
        assert!(EngineDescriptor::parse("this is not an engine").is_err());
    }

    #[test]
    fn test_compile_missing_file() {
        let result = DescriptorCompiler.compile(
            Path::new("/nonexistent/engine.yaml"),
            &EngineSimConfig::default(),
        );
        assert!(matches!(result, Err(ScriptError::NotFound { .. })));
    }

    #[test]
    fn test_compile_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cylinders: banana").unwrap();

        let result = DescriptorCompiler.compile(file.path(), &EngineSimConfig::default());
        assert!(matches!(result, Err(ScriptError::CompilationFailed { .. })));
    }

    #[test]
    fn test_compile_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{INLINE_FOUR}").unwrap();

        let model = DescriptorCompiler
            .compile(file.path(), &EngineSimConfig::default())
            .unwrap();
        assert_eq!(model.telemetry().exhaust_channels, 4);
    }
}
