//! Fixed pool of hardware-sized buffers.

use std::collections::VecDeque;

use crate::error::{Bound, ConfigError, ConfigField};
use crate::synth::OUTPUT_CHANNELS;

/// Fewest buffers a pool may hold.
pub const MIN_BUFFERS: usize = 2;

/// Interleaved stereo buffer of a fixed number of frames.
#[derive(Debug)]
pub struct AudioBuffer {
    samples: Box<[f32]>,
}

impl AudioBuffer {
    fn new(frames: usize) -> Self {
        Self {
            samples: vec![0.0; frames * OUTPUT_CHANNELS].into_boxed_slice(),
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / OUTPUT_CHANNELS
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }
}

/// Buffers handed back and forth between the bridge and the hardware.
///
/// All buffers are allocated in [`BufferPool::new`]; cycling them with
/// [`next_buffer`](BufferPool::next_buffer) and
/// [`release`](BufferPool::release) never allocates.
#[derive(Debug)]
pub struct BufferPool {
    free: VecDeque<AudioBuffer>,
    count: usize,
    frames: usize,
}

impl BufferPool {
    /// Allocate `count` buffers of `frames` stereo frames each.
    pub fn new(count: usize, frames: usize) -> Result<Self, ConfigError> {
        if count < MIN_BUFFERS {
            return Err(ConfigError::out_of_range(
                ConfigField::BufferCount,
                Bound::new(MIN_BUFFERS as f64, f64::INFINITY),
                count as f64,
            ));
        }
        if frames == 0 {
            return Err(ConfigError::out_of_range(
                ConfigField::BufferFrames,
                Bound::new(1.0, f64::INFINITY),
                0.0,
            ));
        }

        let mut free = VecDeque::with_capacity(count);
        free.extend((0..count).map(|_| AudioBuffer::new(frames)));

        Ok(Self {
            free,
            count,
            frames,
        })
    }

    /// Zero-fill every buffer and hand each one to the hardware.
    ///
    /// Called once before playback so the device starts on silence.
    pub fn prime(&mut self, mut sink: impl FnMut(&[f32])) {
        for buffer in self.free.iter_mut() {
            buffer.as_mut_slice().fill(0.0);
            sink(buffer.as_slice());
        }
    }

    /// Take the next free buffer, oldest first.
    pub fn next_buffer(&mut self) -> Option<AudioBuffer> {
        self.free.pop_front()
    }

    /// Return a buffer to the back of the queue.
    pub fn release(&mut self, buffer: AudioBuffer) {
        debug_assert_eq!(buffer.frames(), self.frames);
        if self.free.len() < self.count {
            self.free.push_back(buffer);
        }
    }

    /// Buffers currently in the pool.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Frames per buffer.
    pub fn frames(&self) -> usize {
        self.frames
    }
}
