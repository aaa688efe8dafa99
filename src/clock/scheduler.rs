//! Fixed-rate tick scheduling.

use std::time::{Duration, Instant};

/// Decides when the next tick runs and how much time it covers.
///
/// Holds no thread; the caller supplies `now` so the arithmetic can be
/// tested without sleeping.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    max_dt: Duration,
    /// Start of the previous tick
    last: Instant,
    /// When the next tick is due
    deadline: Instant,
}

impl TickScheduler {
    pub fn new(period: Duration, max_dt: Duration, now: Instant) -> Self {
        Self {
            period,
            max_dt,
            last: now,
            deadline: now + period,
        }
    }

    /// How long to wait before the next tick.
    ///
    /// A clock that has fallen more than one period behind drops the missed
    /// ticks instead of running them back to back.
    pub fn until_next_tick(&mut self, now: Instant) -> Duration {
        let wait = self.deadline.saturating_duration_since(now);
        if now > self.deadline + self.period {
            self.deadline = now;
        }
        self.deadline += self.period;
        wait
    }

    /// Start a tick and return the seconds elapsed since the previous one,
    /// clamped to `max_dt`.
    pub fn begin_tick(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        elapsed.min(self.max_dt).as_secs_f64()
    }
}
