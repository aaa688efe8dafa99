//! Periodic simulation driver.
//!
//! [`SimulationClock`] runs the simulation actor on its own thread: every
//! tick it measures the real elapsed time, clamps it and calls
//! [`Session::update`]. The same thread watches the render fault and underrun
//! counters and reports new ones, so nothing on the audio path has to log.

mod scheduler;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Bound, ConfigError, ConfigField, EngineSimError, HandleError, Result};
use crate::session::{Session, MAX_TIME_STEP};

pub use scheduler::TickScheduler;

/// Default tick rate in hertz.
pub const DEFAULT_TICK_RATE: f64 = 120.0;

/// Default upper bound on the time a single tick integrates.
pub const DEFAULT_MAX_DT: Duration = Duration::from_millis(100);

/// Tick rate and step clamp of a [`SimulationClock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    pub tick_rate: f64,
    pub max_dt: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_dt: DEFAULT_MAX_DT,
        }
    }
}

impl ClockConfig {
    pub fn with_tick_rate(mut self, tick_rate: f64) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    fn period(&self) -> std::result::Result<Duration, ConfigError> {
        let bound = Bound::new(1.0, 10_000.0);
        if !bound.contains(self.tick_rate) {
            return Err(ConfigError::out_of_range(
                ConfigField::TickRate,
                bound,
                self.tick_rate,
            ));
        }
        Ok(Duration::from_secs_f64(1.0 / self.tick_rate))
    }
}

/// What the clock does after an update fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAction {
    Continue,
    Stop,
}

/// Log the fault and keep ticking, unless the session is gone.
pub fn default_fault_policy(error: &EngineSimError) -> ClockAction {
    match error.as_handle_error() {
        Some(HandleError::InvalidHandle) => {
            log::info!("Session destroyed, stopping simulation clock");
            ClockAction::Stop
        }
        Some(HandleError::NotLoaded) => {
            log::debug!("Clock tick skipped: {}", error);
            ClockAction::Continue
        }
        _ => {
            log::warn!("Simulation update failed: {}", error);
            ClockAction::Continue
        }
    }
}

/// Reports counters the audio path bumps without logging.
#[derive(Debug, Default)]
struct FaultObserver {
    render_faults: u64,
    underruns: u64,
}

impl FaultObserver {
    fn observe(&mut self, session: &Session) {
        let Ok(stats) = session.stats() else {
            return;
        };

        if stats.render_faults > self.render_faults {
            log::warn!(
                "{} render fault(s) since last tick ({} total)",
                stats.render_faults - self.render_faults,
                stats.render_faults
            );
            self.render_faults = stats.render_faults;
        }
        if stats.underruns > self.underruns {
            log::debug!(
                "{} underrun(s) since last tick ({} total)",
                stats.underruns - self.underruns,
                stats.underruns
            );
            self.underruns = stats.underruns;
        }
    }
}

/// Thread calling [`Session::update`] at a fixed rate.
pub struct SimulationClock {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl SimulationClock {
    /// Start ticking `session` with [`default_fault_policy`].
    pub fn start(session: Session, config: ClockConfig) -> Result<Self> {
        Self::start_with_policy(session, config, default_fault_policy)
    }

    /// Start ticking `session`, handing every update error to `on_fault`.
    pub fn start_with_policy<F>(session: Session, config: ClockConfig, mut on_fault: F) -> Result<Self>
    where
        F: FnMut(&EngineSimError) -> ClockAction + Send + 'static,
    {
        let period = config.period()?;
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        let flag = Arc::clone(&running);
        let counter = Arc::clone(&ticks);
        let handle = thread::Builder::new()
            .name("enginesim-clock".to_string())
            .spawn(move || {
                log::debug!("Simulation clock started at {} Hz", config.tick_rate);
                let max_dt = config.max_dt.min(Duration::from_secs_f64(MAX_TIME_STEP));
                let mut scheduler = TickScheduler::new(period, max_dt, Instant::now());
                let mut observer = FaultObserver::default();

                while flag.load(Ordering::Acquire) {
                    thread::sleep(scheduler.until_next_tick(Instant::now()));
                    if !flag.load(Ordering::Acquire) {
                        break;
                    }

                    let dt = scheduler.begin_tick(Instant::now());
                    if dt <= 0.0 {
                        continue;
                    }
                    if let Err(e) = session.update(dt) {
                        if on_fault(&e) == ClockAction::Stop {
                            break;
                        }
                    }
                    counter.fetch_add(1, Ordering::Relaxed);
                    observer.observe(&session);
                }

                flag.store(false, Ordering::Release);
                log::debug!("Simulation clock stopped");
            })
            .map_err(|e| EngineSimError::ThreadSpawn {
                name: "clock",
                source: e,
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
            ticks,
        })
    }

    /// Whether the clock thread is still ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stop the clock and wait for its thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Simulation clock thread panicked");
            }
        }
    }
}

impl Drop for SimulationClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::EngineSimConfig;

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn test_rejects_bad_tick_rate() {
        let session = Session::create(EngineSimConfig::default()).unwrap();
        for rate in [0.0, -5.0, f64::NAN] {
            let result = SimulationClock::start(session.clone(), ClockConfig::default().with_tick_rate(rate));
            match result {
                Err(EngineSimError::Config(e)) => assert!(e.names(ConfigField::TickRate)),
                _ => panic!("tick rate {rate} accepted"),
            }
        }
    }

    #[test]
    fn test_clock_drives_updates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cylinders: 4\nidle_rpm: 900\nredline_rpm: 7000").unwrap();
        let session = Session::create(EngineSimConfig::low_latency()).unwrap();
        session.load_script(file.path()).unwrap();

        let mut clock = SimulationClock::start(session.clone(), ClockConfig::default()).unwrap();
        assert!(wait_until(|| session.stats().unwrap().updates >= 5));
        clock.stop();

        assert!(!clock.is_running());
        let updates = session.stats().unwrap().updates;
        assert_eq!(updates, clock.ticks());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(session.stats().unwrap().updates, updates);
    }

    #[test]
    fn test_clock_stops_when_session_is_destroyed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cylinders: 2\nidle_rpm: 1000\nredline_rpm: 8000").unwrap();
        let session = Session::create(EngineSimConfig::default()).unwrap();
        session.load_script(file.path()).unwrap();

        let clock = SimulationClock::start(session.clone(), ClockConfig::default()).unwrap();
        assert!(wait_until(|| clock.ticks() > 0));

        session.destroy().unwrap();
        assert!(wait_until(|| !clock.is_running()));
    }

    #[test]
    fn test_policy_sees_faults() {
        let session = Session::create(EngineSimConfig::default()).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let clock = SimulationClock::start_with_policy(session, ClockConfig::default(), move |e| {
            assert_eq!(e.as_handle_error(), Some(HandleError::NotLoaded));
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                ClockAction::Stop
            } else {
                ClockAction::Continue
            }
        })
        .unwrap();

        assert!(wait_until(|| !clock.is_running()));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(clock.ticks(), 2);
    }
}
