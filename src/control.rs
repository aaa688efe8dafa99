//! Lock-free throttle channel.
//!
//! Only the most recent throttle intent matters, so the channel is a single
//! atomic cell rather than a queue: the input actor overwrites it and the
//! simulation actor reads whatever is there at the start of each update.

use std::sync::atomic::{AtomicU32, Ordering};

/// Single-value, last-writer-wins throttle cell.
///
/// The position is stored as the bit pattern of an `f32`, so reads and
/// writes are a single atomic word and can never tear.
#[derive(Debug)]
pub struct ControlChannel {
    bits: AtomicU32,
}

impl ControlChannel {
    /// Create a channel holding `initial`.
    pub fn new(initial: f32) -> Self {
        Self {
            bits: AtomicU32::new(initial.to_bits()),
        }
    }

    /// Publish a new throttle position.
    #[inline]
    pub fn store(&self, position: f32) {
        self.bits.store(position.to_bits(), Ordering::Release);
    }

    /// Read the latest throttle position.
    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new(0.0)
    }
}
