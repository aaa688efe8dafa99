//! Cross-thread simulation statistics.
//!
//! The simulation actor publishes a fresh set of metrics after every update;
//! any number of readers (UI, logging, the audio bridge) can take a snapshot
//! at any time. Every field is its own atomic word with relaxed ordering, so
//! a snapshot may mix values from neighbouring updates but never contains a
//! torn value.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Point-in-time copy of the session metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Crankshaft speed in revolutions per minute
    pub rpm: f64,
    /// Engine load from 0.0 to 1.0
    pub load: f64,
    /// Exhaust mass flow reported by the engine model
    pub exhaust_flow: f64,
    /// Intake manifold pressure in pascals
    pub manifold_pressure: f64,
    /// Number of exhaust channels feeding the synthesizer
    pub active_channels: u32,
    /// Wall time spent in the last update, in milliseconds
    pub processing_time_ms: f64,
    /// Device buffers that could not be fully rendered
    pub underruns: u64,
    /// Render calls that faulted and produced silence
    pub render_faults: u64,
    /// Completed updates
    pub updates: u64,
}

/// Store an `f64` as its bit pattern.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Lock-free storage behind [`StatsSnapshot`].
#[derive(Debug, Default)]
pub struct EngineStats {
    rpm: AtomicF64,
    load: AtomicF64,
    exhaust_flow: AtomicF64,
    manifold_pressure: AtomicF64,
    active_channels: AtomicU32,
    processing_time_ms: AtomicF64,
    underruns: AtomicU64,
    render_faults: AtomicU64,
    updates: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the metrics of a completed update.
    ///
    /// The counters in `snapshot` are ignored; they are owned by the
    /// `record_*` methods.
    pub fn publish(&self, snapshot: &StatsSnapshot) {
        self.rpm.store(snapshot.rpm);
        self.load.store(snapshot.load);
        self.exhaust_flow.store(snapshot.exhaust_flow);
        self.manifold_pressure.store(snapshot.manifold_pressure);
        self.active_channels
            .store(snapshot.active_channels, Ordering::Relaxed);
        self.processing_time_ms.store(snapshot.processing_time_ms);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a best-effort copy of the current metrics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rpm: self.rpm.load(),
            load: self.load.load(),
            exhaust_flow: self.exhaust_flow.load(),
            manifold_pressure: self.manifold_pressure.load(),
            active_channels: self.active_channels.load(Ordering::Relaxed),
            processing_time_ms: self.processing_time_ms.load(),
            underruns: self.underruns(),
            render_faults: self.render_faults(),
            updates: self.updates.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_render_fault(&self) {
        self.render_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn render_faults(&self) -> u64 {
        self.render_faults.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_publish_and_snapshot() {
        let stats = EngineStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());

        stats.publish(&StatsSnapshot {
            rpm: 3250.5,
            load: 0.5,
            exhaust_flow: 0.012,
            manifold_pressure: 65000.0,
            active_channels: 4,
            processing_time_ms: 0.3,
            underruns: 99,
            ..StatsSnapshot::default()
        });

        let snapshot = stats.snapshot();
        assert_relative_eq!(snapshot.rpm, 3250.5);
        assert_relative_eq!(snapshot.manifold_pressure, 65000.0);
        assert_eq!(snapshot.active_channels, 4);
        assert_eq!(snapshot.updates, 1);
        // Counters are not overwritten by publish
        assert_eq!(snapshot.underruns, 0);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let stats = EngineStats::new();
        let mut last = 0;
        for _ in 0..5 {
            stats.record_underrun();
            let now = stats.underruns();
            assert!(now > last);
            last = now;
        }
        stats.record_render_fault();
        assert_eq!(stats.snapshot().render_faults, 1);
        assert_eq!(stats.snapshot().underruns, 5);
    }
}
