//! Ends of the synthesizer rings owned by the simulation and audio actors.

use super::OUTPUT_CHANNELS;

/// Simulation-side end of the input ring.
pub struct InputWriter {
    producer: rtrb::Producer<f32>,
}

impl InputWriter {
    pub(crate) fn new(producer: rtrb::Producer<f32>) -> Self {
        Self { producer }
    }

    /// Queue one exhaust-flow sample. Returns `false` if the ring is full.
    #[inline]
    pub fn push(&mut self, sample: f32) -> bool {
        self.producer.push(sample).is_ok()
    }
}

/// Result of reading a device buffer out of the output ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The whole buffer was filled with synthesized audio
    Filled,
    /// Not enough audio was queued; the buffer was not touched
    Starved,
    /// The ring returned unusable data; the buffer content is undefined
    Fault,
}

/// Audio-side end of the output ring.
///
/// Reading never allocates, locks or blocks.
pub struct OutputReader {
    consumer: rtrb::Consumer<f32>,
    /// Queued samples the synthesizer aims for
    target_samples: usize,
    /// Backlog above which queued audio is dropped back to the target
    trim_threshold: usize,
}

impl OutputReader {
    pub(crate) fn new(consumer: rtrb::Consumer<f32>, target_frames: usize) -> Self {
        let target_samples = target_frames * OUTPUT_CHANNELS;
        Self {
            consumer,
            target_samples,
            trim_threshold: target_samples * 2,
        }
    }

    /// Samples currently queued.
    pub fn queued_samples(&self) -> usize {
        self.consumer.slots()
    }

    /// Fill `out` (interleaved, a whole number of frames) from the ring.
    ///
    /// Either the whole slice is written or none of it is.
    pub fn read_into(&mut self, out: &mut [f32]) -> ReadOutcome {
        let needed = out.len();
        let available = self.consumer.slots();
        if available < needed {
            return ReadOutcome::Starved;
        }

        let backlog = available - needed;
        if backlog > self.trim_threshold {
            let skip = (backlog - self.target_samples) / OUTPUT_CHANNELS * OUTPUT_CHANNELS;
            match self.consumer.read_chunk(skip) {
                Ok(chunk) => chunk.commit_all(),
                Err(_) => return ReadOutcome::Fault,
            }
        }

        let Ok(chunk) = self.consumer.read_chunk(needed) else {
            return ReadOutcome::Fault;
        };
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..].copy_from_slice(second);
        chunk.commit_all();

        if out.iter().all(|s| s.is_finite()) {
            ReadOutcome::Filled
        } else {
            ReadOutcome::Fault
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_with(samples: &[f32], target_frames: usize) -> OutputReader {
        let (mut tx, rx) = rtrb::RingBuffer::<f32>::new(samples.len().max(1));
        for &s in samples {
            tx.push(s).unwrap();
        }
        OutputReader::new(rx, target_frames)
    }

    #[test]
    fn test_starved_read_leaves_buffer_and_ring() {
        let mut reader = reader_with(&[0.5; 6], 100);
        let mut out = [9.0; 8];

        assert_eq!(reader.read_into(&mut out), ReadOutcome::Starved);
        assert_eq!(out, [9.0; 8]);
        assert_eq!(reader.queued_samples(), 6);
    }

    #[test]
    fn test_filled_read_consumes_exactly() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut reader = reader_with(&samples, 100);
        let mut out = [0.0; 4];

        assert_eq!(reader.read_into(&mut out), ReadOutcome::Filled);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(reader.read_into(&mut out), ReadOutcome::Filled);
        assert_eq!(out, [4.0, 5.0, 6.0, 7.0]);
        assert_eq!(reader.queued_samples(), 2);
    }

    #[test]
    fn test_backlog_is_trimmed_to_target() {
        // 2 frames of target lead, 100 frames queued
        let samples: Vec<f32> = (0..200).map(|i| i as f32).collect();
        let mut reader = reader_with(&samples, 2);
        let mut out = [0.0; 4];

        assert_eq!(reader.read_into(&mut out), ReadOutcome::Filled);
        // Everything but the read and the target lead was skipped
        assert_eq!(reader.queued_samples(), 4);
        assert_eq!(out, [192.0, 193.0, 194.0, 195.0]);
    }

    #[test]
    fn test_non_finite_samples_fault() {
        let mut reader = reader_with(&[0.0, f32::NAN, 0.0, 0.0], 100);
        let mut out = [0.0; 4];
        assert_eq!(reader.read_into(&mut out), ReadOutcome::Fault);
    }
}
