//! Simulator sessions.
//!
//! A [`Session`] owns one engine simulation and its synthesizer. It is shared
//! between the actors that drive it:
//!
//! - the **simulation actor** calls [`Session::update`] at its own cadence
//! - the **audio actor** calls [`Session::render`] from the device callback
//! - the **input actor** calls [`Session::set_throttle`] whenever it likes
//!
//! `Session` is a cheap handle; clones refer to the same simulator. After
//! [`Session::destroy`] every handle keeps answering with
//! [`HandleError::InvalidHandle`] instead of touching freed state.
//!
//! # Real-time safety
//!
//! `render` never allocates, never blocks on a lock and never unwinds into
//! the caller. Its only shared state is the output ring (wait-free SPSC), the
//! render mutex (taken with `try_lock`, contended only by `destroy`) and the
//! stats atomics.

mod simulation;
mod state;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;

use crate::config::{validate, EngineSimConfig};
use crate::control::ControlChannel;
use crate::engine::{DescriptorCompiler, ScriptCompiler};
use crate::error::{Bound, ConfigError, ConfigField, HandleError, Result, RuntimeError};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::synth::{create_pipeline, OutputReader, ReadOutcome, SynthesisThread, OUTPUT_CHANNELS};

use simulation::Simulation;
use state::AtomicState;

pub use state::SessionState;

/// Longest time a single `update` may advance, in seconds.
pub const MAX_TIME_STEP: f64 = 1.0;

/// Handle to a simulator session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: EngineSimConfig,
    state: AtomicState,
    throttle: ControlChannel,
    stats: EngineStats,
    compiler: Box<dyn ScriptCompiler>,
    /// Set while an `update` is running
    updating: AtomicBool,
    simulation: Mutex<Option<Simulation>>,
    /// Render side; only ever `try_lock`ed by `render`
    output: Mutex<Option<OutputReader>>,
    synthesis_thread: Mutex<Option<SynthesisThread>>,
    last_error: Mutex<Option<String>>,
    /// Makes the next render panic inside the render path
    #[cfg(test)]
    fail_render: AtomicBool,
}

/// Clears the single-writer flag when an update ends.
struct UpdateGuard<'a>(&'a AtomicBool);

impl<'a> UpdateGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create a session using the built-in YAML descriptor compiler.
    ///
    /// The configuration is validated first; if it is rejected nothing is
    /// allocated.
    pub fn create(config: EngineSimConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_compiler(config, DescriptorCompiler)
    }

    /// Create a session that loads engines through `compiler`.
    pub fn with_compiler(
        config: EngineSimConfig,
        compiler: impl ScriptCompiler + 'static,
    ) -> std::result::Result<Self, ConfigError> {
        validate(&config)?;

        let (writer, synthesizer, reader) = create_pipeline(&config);
        let simulation = Simulation::new(&config, writer, synthesizer);

        log::info!(
            "Session created: {} Hz, {} Hz simulation, {:.0} ms target latency",
            config.sample_rate,
            config.simulation_frequency,
            config.target_synthesizer_latency * 1000.0
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                state: AtomicState::new(SessionState::Ready),
                throttle: ControlChannel::default(),
                stats: EngineStats::new(),
                compiler: Box::new(compiler),
                updating: AtomicBool::new(false),
                simulation: Mutex::new(Some(simulation)),
                output: Mutex::new(Some(reader)),
                synthesis_thread: Mutex::new(None),
                last_error: Mutex::new(None),
                #[cfg(test)]
                fail_render: AtomicBool::new(false),
            }),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &EngineSimConfig {
        &self.inner.config
    }

    /// Message of the most recent failed `load_script`, `start_audio_thread`
    /// or `update`.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    /// Load an engine description.
    ///
    /// Returns `Ok` once the engine is ready to be updated and rendered.
    /// Loading again replaces the running engine.
    pub fn load_script(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.inner.state.require(SessionState::Ready)?;

        let model = self
            .inner
            .record(self.inner.compiler.compile(path, &self.inner.config).map_err(Into::into))?;

        lock(&self.inner.simulation)
            .as_mut()
            .ok_or(HandleError::InvalidHandle)?
            .install(model);

        self.inner
            .state
            .advance(SessionState::Ready, SessionState::ScriptLoaded);
        log::info!("Engine script loaded from {:?}", path);
        Ok(())
    }

    /// Move synthesis onto a dedicated thread.
    pub fn start_audio_thread(&self) -> Result<()> {
        let state = self.inner.state.require(SessionState::ScriptLoaded)?;
        if state == SessionState::AudioThreadRunning {
            return Err(HandleError::AlreadyRunning.into());
        }

        let mut slot = lock(&self.inner.synthesis_thread);
        if slot.is_some() {
            return Err(HandleError::AlreadyRunning.into());
        }

        let synthesizer = lock(&self.inner.simulation)
            .as_ref()
            .map(Simulation::synthesizer)
            .ok_or(HandleError::InvalidHandle)?;
        let thread = self.inner.record(SynthesisThread::spawn(synthesizer))?;

        if let Some(simulation) = lock(&self.inner.simulation).as_mut() {
            simulation.set_waker(thread.waker());
        }
        *slot = Some(thread);

        if !self
            .inner
            .state
            .advance(SessionState::ScriptLoaded, SessionState::AudioThreadRunning)
        {
            // Destroyed meanwhile
            drop(slot.take());
            return Err(HandleError::InvalidHandle.into());
        }

        log::info!("Synthesis thread started");
        Ok(())
    }

    /// Publish a new throttle position in `[0, 1]`.
    ///
    /// A single atomic store; safe to call from any thread at any time.
    pub fn set_throttle(&self, position: f64) -> Result<()> {
        self.inner.state.require(SessionState::Ready)?;

        let bound = Bound::new(0.0, 1.0);
        if !bound.contains(position) {
            return Err(ConfigError::out_of_range(ConfigField::Throttle, bound, position).into());
        }

        self.inner.throttle.store(position as f32);
        Ok(())
    }

    /// The throttle position the next update will use.
    pub fn throttle(&self) -> f32 {
        self.inner.throttle.load()
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// `dt` must be positive and at most [`MAX_TIME_STEP`]. Calls must be
    /// serialized; an update entered while another is running is rejected
    /// with [`RuntimeError::ConcurrentUpdate`].
    pub fn update(&self, dt: f64) -> Result<()> {
        let inner = &*self.inner;
        inner.state.require(SessionState::ScriptLoaded)?;

        if !(dt > 0.0 && dt <= MAX_TIME_STEP) {
            return Err(ConfigError::out_of_range(
                ConfigField::TimeStep,
                Bound::new(0.0, MAX_TIME_STEP),
                dt,
            )
            .into());
        }

        let _guard = UpdateGuard::acquire(&inner.updating).ok_or(RuntimeError::ConcurrentUpdate)?;
        let started = Instant::now();
        let throttle = inner.throttle.load() as f64;

        let advanced = {
            let mut simulation = lock(&inner.simulation);
            let simulation = simulation.as_mut().ok_or(HandleError::InvalidHandle)?;
            simulation.advance(throttle, dt)
        };
        let telemetry = inner
            .record(advanced.map_err(Into::into))?
            .ok_or(HandleError::NotLoaded)?;

        inner.stats.publish(&StatsSnapshot {
            rpm: telemetry.rpm,
            load: telemetry.load,
            exhaust_flow: telemetry.exhaust_flow,
            manifold_pressure: telemetry.manifold_pressure,
            active_channels: telemetry.exhaust_channels,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            ..StatsSnapshot::default()
        });
        Ok(())
    }

    /// Fill `buffer` with `frame_count` interleaved stereo frames.
    ///
    /// Returns `Ok(frame_count)` when the frames were synthesized and
    /// `Ok(0)` when they were not, in which case the frames are silence.
    /// Before a script is loaded or after `destroy` an error is returned and
    /// `buffer` is left untouched.
    pub fn render(&self, buffer: &mut [f32], frame_count: usize) -> Result<usize> {
        let inner = &*self.inner;
        inner.state.require(SessionState::ScriptLoaded)?;
        if frame_count == 0 {
            return Ok(0);
        }

        match catch_unwind(AssertUnwindSafe(|| inner.render_frames(buffer, frame_count))) {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                buffer.fill(0.0);
                inner.stats.record_render_fault();
                Ok(0)
            }
        }
    }

    /// Best-effort copy of the latest metrics.
    pub fn stats(&self) -> Result<StatsSnapshot> {
        self.inner.state.require(SessionState::Ready)?;
        Ok(self.inner.stats.snapshot())
    }

    /// Stop synthesis and release every resource of the session.
    ///
    /// Waits for an in-flight `render` to return before the output ring is
    /// released. Every later call on any handle returns
    /// [`HandleError::InvalidHandle`].
    pub fn destroy(&self) -> Result<()> {
        let inner = &*self.inner;
        if inner.state.dispose() == SessionState::Disposed {
            return Err(HandleError::InvalidHandle.into());
        }

        // Stop the synthesis thread first so nothing feeds the output ring
        let thread = lock(&inner.synthesis_thread).take();
        drop(thread);

        let reader = lock(&inner.output).take();
        if let Some(reader) = &reader {
            log::debug!(
                "Flushed {} queued samples on destroy",
                reader.queued_samples()
            );
        }
        drop(reader);

        let simulation = lock(&inner.simulation).take();
        drop(simulation);

        log::info!("Session destroyed");
        Ok(())
    }

    /// Counters shared with the audio bridge.
    pub(crate) fn engine_stats(&self) -> &EngineStats {
        &self.inner.stats
    }
}

impl SessionInner {
    /// Remember the message of a failed operation.
    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            *lock(&self.last_error) = Some(e.to_string());
        }
        result
    }

    fn render_frames(
        &self,
        buffer: &mut [f32],
        frame_count: usize,
    ) -> std::result::Result<usize, HandleError> {
        let needed = match frame_count.checked_mul(OUTPUT_CHANNELS) {
            Some(needed) if needed <= buffer.len() => needed,
            _ => {
                buffer.fill(0.0);
                self.stats.record_render_fault();
                return Ok(0);
            }
        };

        let mut guard = match self.output.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                buffer[..needed].fill(0.0);
                self.stats.record_render_fault();
                return Ok(0);
            }
        };
        let Some(reader) = guard.as_mut() else {
            return Err(HandleError::InvalidHandle);
        };

        #[cfg(test)]
        if self.fail_render.swap(false, Ordering::Relaxed) {
            panic!("render failure requested");
        }

        let out = &mut buffer[..needed];
        match reader.read_into(out) {
            ReadOutcome::Filled => Ok(frame_count),
            ReadOutcome::Starved => {
                out.fill(0.0);
                Ok(0)
            }
            ReadOutcome::Fault => {
                out.fill(0.0);
                self.stats.record_render_fault();
                Ok(0)
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("sample_rate", &self.inner.config.sample_rate)
            .finish()
    }
}
