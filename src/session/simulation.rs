//! Simulation-side state of a session.

use std::sync::{Arc, Mutex};
use std::thread::Thread;

use crate::config::EngineSimConfig;
use crate::engine::{EngineModel, EngineTelemetry};
use crate::error::RuntimeError;
use crate::synth::{InputWriter, Resampler, Synthesizer};

/// Everything `update` touches, guarded by the session's simulation mutex.
pub(crate) struct Simulation {
    model: Option<Box<dyn EngineModel>>,
    /// Length of one physics step in seconds
    step_dt: f64,
    /// Time handed to `advance` but not yet covered by whole steps
    pending_time: f64,
    resampler: Resampler,
    writer: InputWriter,
    synthesizer: Arc<Mutex<Synthesizer>>,
    /// Synthesis thread to wake after queueing input; `None` runs inline
    waker: Option<Thread>,
    /// Exhaust samples lost to a full pipeline
    dropped_samples: u64,
}

impl Simulation {
    pub(crate) fn new(
        config: &EngineSimConfig,
        writer: InputWriter,
        synthesizer: Synthesizer,
    ) -> Self {
        Self {
            model: None,
            step_dt: 1.0 / config.simulation_frequency as f64,
            pending_time: 0.0,
            resampler: Resampler::new(config.simulation_frequency, config.sample_rate),
            writer,
            synthesizer: Arc::new(Mutex::new(synthesizer)),
            waker: None,
            dropped_samples: 0,
        }
    }

    /// Replace the engine model.
    pub(crate) fn install(&mut self, model: Box<dyn EngineModel>) {
        self.model = Some(model);
        self.pending_time = 0.0;
    }

    pub(crate) fn synthesizer(&self) -> Arc<Mutex<Synthesizer>> {
        Arc::clone(&self.synthesizer)
    }

    /// Hand synthesis over to a background thread.
    pub(crate) fn set_waker(&mut self, waker: Option<Thread>) {
        self.waker = waker;
    }

    #[cfg(test)]
    pub(crate) fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Advance the model by `dt` seconds and queue the exhaust it produced.
    pub(crate) fn advance(
        &mut self,
        throttle: f64,
        dt: f64,
    ) -> Result<Option<EngineTelemetry>, RuntimeError> {
        let Self {
            model,
            step_dt,
            pending_time,
            resampler,
            writer,
            synthesizer,
            waker,
            dropped_samples,
        } = self;
        let Some(model) = model.as_mut() else {
            return Ok(None);
        };

        *pending_time += dt;
        let steps = (*pending_time / *step_dt).floor() as u64;
        *pending_time -= steps as f64 * *step_dt;

        let mut dropped = 0u64;
        // Set once a flush made no room; the rest of this call is dropped
        let mut stalled = false;
        for _ in 0..steps {
            model.step(throttle, *step_dt)?;
            resampler.push(model.exhaust_flow(), |sample| {
                if writer.push(sample) {
                    return;
                }
                if !stalled {
                    flush(&**synthesizer);
                    if writer.push(sample) {
                        return;
                    }
                    stalled = true;
                }
                dropped += 1;
            });
        }

        if dropped > 0 {
            *dropped_samples += dropped;
            log::debug!(
                "Dropped {} exhaust samples: output ring is full ({} total)",
                dropped,
                dropped_samples
            );
        }

        match waker {
            Some(thread) => thread.unpark(),
            None => flush(&**synthesizer),
        }

        Ok(Some(model.telemetry()))
    }
}

fn flush(synthesizer: &Mutex<Synthesizer>) {
    if let Ok(mut synth) = synthesizer.lock() {
        synth.process_pending();
    }
}
