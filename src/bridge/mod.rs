//! Hardware side of the audio path.
//!
//! The bridge never keeps time. Whatever drives the device (a driver
//! callback, or the paced writer of the CLI) calls [`AudioRenderBridge::fill`]
//! or [`AudioRenderBridge::service`] once per hardware buffer, and the bridge
//! pulls that many frames out of the session.

mod pool;

use crate::session::Session;
use crate::synth::OUTPUT_CHANNELS;

pub use pool::{AudioBuffer, BufferPool, MIN_BUFFERS};

/// Pulls rendered audio from a [`Session`] into hardware buffers.
#[derive(Debug, Clone)]
pub struct AudioRenderBridge {
    session: Session,
}

impl AudioRenderBridge {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Render into an interleaved stereo buffer.
    ///
    /// Returns the frames that carry synthesized audio. Anything the session
    /// could not provide is silenced and counted as one underrun; playback
    /// is expected to carry on with the next buffer.
    pub fn fill(&self, buffer: &mut [f32]) -> usize {
        let frames = buffer.len() / OUTPUT_CHANNELS;
        if frames == 0 {
            buffer.fill(0.0);
            return 0;
        }

        let rendered = self.session.render(buffer, frames).unwrap_or(0);
        if rendered < frames {
            buffer[rendered * OUTPUT_CHANNELS..].fill(0.0);
            self.session.engine_stats().record_underrun();
        } else {
            // Odd trailing sample, if any
            buffer[frames * OUTPUT_CHANNELS..].fill(0.0);
        }
        rendered
    }

    /// One hardware cycle: take a buffer, fill it, hand it to `sink` and put
    /// it back in the pool.
    ///
    /// Returns `None` if every buffer of the pool is checked out.
    pub fn service(&self, pool: &mut BufferPool, sink: impl FnOnce(&[f32])) -> Option<usize> {
        let mut buffer = pool.next_buffer()?;
        let rendered = self.fill(buffer.as_mut_slice());
        sink(buffer.as_slice());
        pool.release(buffer);
        Some(rendered)
    }

    /// Short renders seen by this session so far.
    pub fn underruns(&self) -> u64 {
        self.session.engine_stats().underruns()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::EngineSimConfig;

    fn loaded_session() -> (Session, NamedTempFile) {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cylinders: 6\nidle_rpm: 750\nredline_rpm: 6500").unwrap();
        let session = Session::create(EngineSimConfig::low_latency()).unwrap();
        session.load_script(file.path()).unwrap();
        (session, file)
    }

    #[test]
    fn test_short_render_counts_one_underrun() {
        let (session, _file) = loaded_session();
        let bridge = AudioRenderBridge::new(session.clone());
        let mut buf = vec![0.3f32; 256 * OUTPUT_CHANNELS];

        // Nothing synthesized yet
        assert_eq!(bridge.fill(&mut buf), 0);
        assert!(buf.iter().all(|s| *s == 0.0));
        assert_eq!(bridge.underruns(), 1);

        session.update(1.0 / 60.0).unwrap();
        assert_eq!(bridge.fill(&mut buf), 256);
        assert_eq!(bridge.fill(&mut buf), 256);
        assert_eq!(bridge.underruns(), 1);
        assert_eq!(session.stats().unwrap().underruns, 1);
    }

    #[test]
    fn test_fill_after_destroy_is_silent() {
        let (session, _file) = loaded_session();
        session.update(1.0 / 60.0).unwrap();
        let bridge = AudioRenderBridge::new(session.clone());
        session.destroy().unwrap();

        let mut buf = vec![0.3f32; 128 * OUTPUT_CHANNELS];
        assert_eq!(bridge.fill(&mut buf), 0);
        assert!(buf.iter().all(|s| *s == 0.0));
        assert_eq!(bridge.underruns(), 1);
    }

    #[test]
    fn test_service_cycles_pool() {
        let (session, _file) = loaded_session();
        let bridge = AudioRenderBridge::new(session.clone());
        let mut pool = BufferPool::new(3, 128).unwrap();
        let mut written = Vec::new();

        pool.prime(|samples| written.extend_from_slice(samples));
        assert_eq!(written.len(), 3 * 128 * OUTPUT_CHANNELS);

        for _ in 0..6 {
            session.update(1.0 / 120.0).unwrap();
            let rendered = bridge
                .service(&mut pool, |samples| written.extend_from_slice(samples))
                .unwrap();
            assert_eq!(rendered, 128);
        }

        assert_eq!(pool.available(), 3);
        assert_eq!(written.len(), 9 * 128 * OUTPUT_CHANNELS);
        assert_eq!(bridge.underruns(), 0);
    }
}
