//! Engine collaborator interface.
//!
//! The session does not know how an engine is described or simulated. It
//! hands a script path to a [`ScriptCompiler`], gets back a boxed
//! [`EngineModel`], and from then on only asks the model to advance and to
//! report its exhaust flow.
//!
//! The crate ships one small collaborator, [`DescriptorCompiler`], which reads
//! a YAML engine descriptor and drives a [`ProceduralEngine`]:
//!
//! ```yaml
//! name: inline-4
//! cylinders: 4
//! idle_rpm: 850
//! redline_rpm: 6800
//! ```

mod descriptor;
mod procedural;

use std::path::Path;

use crate::config::EngineSimConfig;
use crate::error::{RuntimeError, ScriptError};

pub use descriptor::{DescriptorCompiler, EngineDescriptor};
pub use procedural::ProceduralEngine;

/// Physical state reported by an engine model after a step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineTelemetry {
    /// Crankshaft speed in revolutions per minute
    pub rpm: f64,
    /// Engine load from 0.0 to 1.0
    pub load: f64,
    /// Exhaust mass flow
    pub exhaust_flow: f64,
    /// Intake manifold pressure in pascals
    pub manifold_pressure: f64,
    /// Number of exhaust channels
    pub exhaust_channels: u32,
}

/// A loaded, running engine.
///
/// Models are stepped from the simulation thread only.
pub trait EngineModel: Send {
    /// Advance the model by `dt` seconds at `throttle` (0.0 to 1.0).
    fn step(&mut self, throttle: f64, dt: f64) -> Result<(), RuntimeError>;

    /// Exhaust flow at the end of the last step.
    fn exhaust_flow(&self) -> f64;

    /// Current physical state.
    fn telemetry(&self) -> EngineTelemetry;
}

/// Turns an engine description on disk into an [`EngineModel`].
pub trait ScriptCompiler: Send + Sync {
    /// Load and compile the description at `path`.
    ///
    /// Returns `Ok` only with a model that is ready to be stepped.
    fn compile(
        &self,
        path: &Path,
        config: &EngineSimConfig,
    ) -> Result<Box<dyn EngineModel>, ScriptError>;
}
