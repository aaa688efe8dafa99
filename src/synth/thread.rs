//! Dedicated synthesis thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crate::error::{EngineSimError, Result};

use super::Synthesizer;

/// Longest the thread sleeps without being woken by the simulation.
const IDLE_WAIT: Duration = Duration::from_millis(2);

/// Runs [`Synthesizer::process_pending`] off the simulation thread.
///
/// The simulation wakes the thread after queueing input; the thread also
/// polls on a short timeout so a missed wake-up costs at most `IDLE_WAIT`.
pub struct SynthesisThread {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl SynthesisThread {
    /// Start processing `synthesizer` on a new thread.
    pub fn spawn(synthesizer: Arc<Mutex<Synthesizer>>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("enginesim-synth".to_string())
            .spawn(move || {
                log::debug!("Synthesis thread started");
                while flag.load(Ordering::Acquire) {
                    if let Ok(mut synth) = synthesizer.lock() {
                        synth.process_pending();
                    }
                    thread::park_timeout(IDLE_WAIT);
                }
                log::debug!("Synthesis thread stopped");
            })
            .map_err(|e| EngineSimError::ThreadSpawn {
                name: "synthesis",
                source: e,
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    /// Handle used to wake the thread.
    pub fn waker(&self) -> Option<Thread> {
        self.handle.as_ref().map(|h| h.thread().clone())
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Synthesis thread panicked");
            }
        }
    }
}

impl Drop for SynthesisThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::config::EngineSimConfig;
    use crate::synth::create_pipeline;

    #[test]
    fn test_thread_drains_input() {
        let (mut writer, synth, reader) = create_pipeline(&EngineSimConfig::low_latency());
        let synth = Arc::new(Mutex::new(synth));
        let mut thread = SynthesisThread::spawn(Arc::clone(&synth)).unwrap();

        for _ in 0..256 {
            assert!(writer.push(0.25));
        }
        thread.waker().unwrap().unpark();

        let deadline = Instant::now() + Duration::from_secs(2);
        while reader.queued_samples() < 512 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(reader.queued_samples(), 512);

        thread.stop();
        assert!(thread.waker().is_none());
    }
}
