//! Audio output for the CLI frontend.
//!
//! Writes raw interleaved stereo `f32` little-endian PCM to any `Write`
//! sink, paced in real time by a [`PacedDevice`] standing in for a sound
//! card.
//!
//! ```bash
//! enginesim engine.yaml | ffplay -f f32le -ac 2 -ar 48000 -
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::bridge::{AudioRenderBridge, BufferPool};
use crate::error::{EngineSimError, Result};
use crate::synth::OUTPUT_CHANNELS;

/// PCM writer over a byte sink.
pub struct AudioOutput<W: Write> {
    sink: W,
    buffer: Vec<u8>,
}

impl<W: Write> AudioOutput<W> {
    /// Create a writer with room for `frames` stereo frames per block.
    pub fn new(sink: W, frames: usize) -> Self {
        Self {
            sink,
            buffer: vec![0u8; frames * OUTPUT_CHANNELS * 4],
        }
    }

    /// Write a block of samples.
    pub fn write_block(&mut self, samples: &[f32]) -> Result<()> {
        let bytes_needed = samples.len() * 4;
        if self.buffer.len() < bytes_needed {
            self.buffer.resize(bytes_needed, 0);
        }

        for (bytes, sample) in self.buffer.chunks_exact_mut(4).zip(samples) {
            bytes.copy_from_slice(&sample.to_le_bytes());
        }

        self.sink
            .write_all(&self.buffer[..bytes_needed])
            .map_err(|e| EngineSimError::AudioOutput {
                message: e.to_string(),
            })
    }

    /// Flush the output stream.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush().map_err(|e| EngineSimError::AudioOutput {
            message: e.to_string(),
        })
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Thread that services the bridge once per buffer period.
pub struct PacedDevice {
    handle: Option<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
}

impl PacedDevice {
    /// Prime `pool` into `output`, then keep requesting buffers at the rate
    /// `sample_rate` plays them back.
    pub fn start<W>(
        bridge: AudioRenderBridge,
        mut pool: BufferPool,
        mut output: AudioOutput<W>,
        sample_rate: u32,
    ) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let period = Duration::from_secs_f64(pool.frames() as f64 / sample_rate.max(1) as f64);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("enginesim-device".to_string())
            .spawn(move || {
                let result = run_device(&bridge, &mut pool, &mut output, period, &flag);
                flag.store(false, Ordering::Release);
                if let Err(e) = &result {
                    log::error!("Audio device stopped: {}", e);
                }
                result
            })
            .map_err(|e| EngineSimError::ThreadSpawn {
                name: "audio device",
                source: e,
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    /// Whether the device is still playing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop playback and return the error that ended it early, if any.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(EngineSimError::AudioOutput {
                message: "audio device thread panicked".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for PacedDevice {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn run_device<W: Write>(
    bridge: &AudioRenderBridge,
    pool: &mut BufferPool,
    output: &mut AudioOutput<W>,
    period: Duration,
    running: &AtomicBool,
) -> Result<()> {
    let mut written = Ok(());
    pool.prime(|samples| {
        if written.is_ok() {
            written = output.write_block(samples);
        }
    });
    written?;
    output.flush()?;

    // The primed buffers are queued ahead of the first request
    let mut deadline = Instant::now() + period * pool.count() as u32;
    while running.load(Ordering::Acquire) {
        thread::sleep(deadline.saturating_duration_since(Instant::now()));
        deadline += period;

        let mut written = Ok(());
        bridge.service(pool, |samples| written = output.write_block(samples));
        written?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use super::*;
    use crate::config::EngineSimConfig;
    use crate::session::Session;

    /// Byte sink that can be inspected while a device writes to it.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_block_is_little_endian() {
        let mut output = AudioOutput::new(Vec::new(), 1);
        output.write_block(&[1.0, -0.5]).unwrap();
        output.write_block(&[0.25, 0.0, 2.0, 3.0]).unwrap();

        let bytes = output.into_inner();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-0.5f32).to_le_bytes());
        assert_eq!(&bytes[20..], &3.0f32.to_le_bytes());
    }

    #[test]
    fn test_device_primes_and_keeps_writing() {
        let session = Session::create(EngineSimConfig::default()).unwrap();
        let bridge = AudioRenderBridge::new(session);
        let pool = BufferPool::new(3, 480).unwrap();
        let sink = SharedSink::default();

        let mut device =
            PacedDevice::start(bridge.clone(), pool, AudioOutput::new(sink.clone(), 480), 48_000)
                .unwrap();

        let block_bytes = 480 * OUTPUT_CHANNELS * 4;
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.0.lock().unwrap().len() < 5 * block_bytes && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        device.stop().unwrap();
        assert!(!device.is_running());

        let bytes = sink.0.lock().unwrap();
        assert!(bytes.len() >= 5 * block_bytes);
        assert_eq!(bytes.len() % block_bytes, 0);
        // No engine loaded: every buffer is silence and an underrun
        assert!(bytes.iter().all(|b| *b == 0));
        assert!(bridge.underruns() >= 2);
    }

    #[test]
    fn test_device_stops_on_write_error() {
        let session = Session::create(EngineSimConfig::default()).unwrap();
        let pool = BufferPool::new(2, 64).unwrap();

        let mut device = PacedDevice::start(
            AudioRenderBridge::new(session),
            pool,
            AudioOutput::new(ClosedPipe, 64),
            48_000,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while device.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(device.stop(), Err(EngineSimError::AudioOutput { .. })));
    }
}
