//! Lumped crankshaft model with evenly fired exhaust pulses.
//!
//! The model integrates crank speed from a throttle-dependent drive torque
//! against friction and pumping losses, and emits one half-sine exhaust pulse
//! per cylinder per 720° cycle. It is a test collaborator for the bridge,
//! not a combustion model.

use std::f64::consts::{PI, TAU};

use crate::error::RuntimeError;

use super::{EngineDescriptor, EngineModel, EngineTelemetry};

/// Standard atmosphere in pascals.
const ATMOSPHERIC_PRESSURE: f64 = 101_325.0;

/// Manifold pressure with the throttle closed, as a fraction of atmosphere.
const CLOSED_THROTTLE_PRESSURE: f64 = 0.25;

/// Time constant of the manifold filling, in seconds.
const MANIFOLD_TIME_CONSTANT: f64 = 0.05;

/// Pumping loss torque per rad/s at closed throttle.
const PUMPING_LOSS: f64 = 0.1;

/// Throttle opening the idle governor adds when sitting exactly at idle.
const IDLE_BASE_OPENING: f64 = 0.08;

/// Largest opening the idle governor will add.
const IDLE_MAX_OPENING: f64 = 0.3;

/// One four-stroke cycle in radians of crank rotation.
const CYCLE: f64 = 2.0 * TAU;

/// Lumped-parameter engine driven by a [`EngineDescriptor`].
#[derive(Debug, Clone)]
pub struct ProceduralEngine {
    descriptor: EngineDescriptor,
    /// Integration substeps per `step`
    substeps: u32,
    /// Crank speed in rad/s
    omega: f64,
    /// Crank angle within the 720° cycle
    angle: f64,
    /// Intake manifold pressure in pascals
    manifold_pressure: f64,
    /// Throttle opening after the idle governor
    effective_throttle: f64,
    exhaust_flow: f64,
}

impl ProceduralEngine {
    /// Create an engine sitting at idle.
    pub fn new(descriptor: EngineDescriptor, substeps: u32) -> Self {
        let omega = rpm_to_omega(descriptor.idle_rpm);
        let mut engine = Self {
            descriptor,
            substeps: substeps.max(1),
            omega,
            angle: 0.0,
            manifold_pressure: ATMOSPHERIC_PRESSURE * CLOSED_THROTTLE_PRESSURE,
            effective_throttle: IDLE_BASE_OPENING,
            exhaust_flow: 0.0,
        };
        engine.exhaust_flow = engine.compute_exhaust_flow();
        engine
    }

    /// Current crank speed in rpm.
    pub fn rpm(&self) -> f64 {
        self.omega * 60.0 / TAU
    }

    /// Opening the idle governor adds at the current speed.
    fn idle_opening(&self) -> f64 {
        let idle = self.descriptor.idle_rpm;
        (IDLE_BASE_OPENING + (idle - self.rpm()) / idle).clamp(0.0, IDLE_MAX_OPENING)
    }

    /// Fraction of peak torque available at the current speed.
    fn torque_curve(&self) -> f64 {
        let x = (self.rpm() / self.descriptor.redline_rpm).clamp(0.0, 1.0);
        0.6 + 0.4 * (PI * x).sin()
    }

    /// Normalized manifold filling, 0.0 closed to 1.0 wide open.
    fn charge(&self) -> f64 {
        let ratio = self.manifold_pressure / ATMOSPHERIC_PRESSURE;
        ((ratio - CLOSED_THROTTLE_PRESSURE) / (1.0 - CLOSED_THROTTLE_PRESSURE)).clamp(0.0, 1.0)
    }

    fn integrate(&mut self, throttle: f64, h: f64) {
        self.effective_throttle = throttle.max(self.idle_opening());

        let target = ATMOSPHERIC_PRESSURE
            * (CLOSED_THROTTLE_PRESSURE + (1.0 - CLOSED_THROTTLE_PRESSURE) * self.effective_throttle);
        let alpha = (h / MANIFOLD_TIME_CONSTANT).min(1.0);
        self.manifold_pressure += (target - self.manifold_pressure) * alpha;

        let drive = if self.rpm() >= self.descriptor.redline_rpm {
            0.0
        } else {
            self.descriptor.peak_torque_nm * self.torque_curve() * self.charge()
        };
        let losses = (self.descriptor.friction
            + PUMPING_LOSS * (1.0 - self.effective_throttle))
            * self.omega;

        self.omega = (self.omega + (drive - losses) / self.descriptor.inertia * h).max(0.0);
        self.angle = (self.angle + self.omega * h).rem_euclid(CYCLE);
    }

    /// Sum of the exhaust pulses of all cylinders at the current angle.
    fn compute_exhaust_flow(&self) -> f64 {
        let cylinders = self.descriptor.cylinders;
        let spacing = CYCLE / cylinders as f64;

        let pulses: f64 = (0..cylinders)
            .map(|i| {
                let local = (self.angle + i as f64 * spacing).rem_euclid(CYCLE);
                // Exhaust stroke is the last 180° of the cycle
                if local >= 3.0 * PI {
                    (local - 3.0 * PI).sin()
                } else {
                    0.0
                }
            })
            .sum();

        let speed = 0.3 + 0.7 * (self.rpm() / self.descriptor.redline_rpm).min(1.0);
        pulses * (0.2 + 0.8 * self.charge()) * speed
    }
}

impl EngineModel for ProceduralEngine {
    fn step(&mut self, throttle: f64, dt: f64) -> Result<(), RuntimeError> {
        let h = dt / self.substeps as f64;
        for _ in 0..self.substeps {
            self.integrate(throttle.clamp(0.0, 1.0), h);
        }
        self.exhaust_flow = self.compute_exhaust_flow();

        if !(self.omega.is_finite() && self.exhaust_flow.is_finite()) {
            return Err(RuntimeError::update_fault(format!(
                "engine '{}' diverged (omega = {}, flow = {})",
                self.descriptor.name, self.omega, self.exhaust_flow
            )));
        }
        Ok(())
    }

    fn exhaust_flow(&self) -> f64 {
        self.exhaust_flow
    }

    fn telemetry(&self) -> EngineTelemetry {
        EngineTelemetry {
            rpm: self.rpm(),
            load: self.charge(),
            exhaust_flow: self.exhaust_flow,
            manifold_pressure: self.manifold_pressure,
            exhaust_channels: self.descriptor.cylinders,
        }
    }
}

fn rpm_to_omega(rpm: f64) -> f64 {
    rpm * TAU / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline_four() -> EngineDescriptor {
        EngineDescriptor::parse("name: test\ncylinders: 4\nidle_rpm: 850\nredline_rpm: 6800\n")
            .unwrap()
    }

    fn run(engine: &mut ProceduralEngine, throttle: f64, seconds: f64) {
        let dt = 1.0 / 10_000.0;
        for _ in 0..(seconds / dt) as usize {
            engine.step(throttle, dt).unwrap();
        }
    }

    #[test]
    fn test_starts_at_idle() {
        let engine = ProceduralEngine::new(inline_four(), 8);
        assert!((engine.rpm() - 850.0).abs() < 1e-9);
        assert_eq!(engine.telemetry().exhaust_channels, 4);
    }

    #[test]
    fn test_idle_governor_holds_speed() {
        let mut engine = ProceduralEngine::new(inline_four(), 4);
        run(&mut engine, 0.0, 3.0);

        let rpm = engine.rpm();
        assert!(rpm > 400.0 && rpm < 2500.0, "idle drifted to {rpm}");
    }

    #[test]
    fn test_throttle_revs_up_to_limiter() {
        let mut engine = ProceduralEngine::new(inline_four(), 4);
        run(&mut engine, 1.0, 3.0);

        let telemetry = engine.telemetry();
        assert!(telemetry.rpm > 3000.0, "only reached {} rpm", telemetry.rpm);
        assert!(telemetry.rpm < 6800.0 * 1.05);
        assert!(telemetry.load > 0.9);
        assert!(telemetry.manifold_pressure > 0.9 * ATMOSPHERIC_PRESSURE);
    }

    #[test]
    fn test_exhaust_flow_pulses() {
        let mut engine = ProceduralEngine::new(inline_four(), 8);
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for _ in 0..2000 {
            engine.step(0.3, 1.0 / 10_000.0).unwrap();
            min = min.min(engine.exhaust_flow());
            max = max.max(engine.exhaust_flow());
        }
        assert!(min >= 0.0);
        assert!(max > min);
    }
}
