//! Exhaust audio synthesizer.
//!
//! The synthesizer sits between the two clocks:
//!
//! ```text
//! ┌──────────────────┐  exhaust flow   ┌──────────────┐  stereo frames  ┌──────────────┐
//! │ Simulation actor │───────────────►│ Synthesizer  │────────────────►│ Audio bridge │
//! │  (update, 120Hz) │  input ring     │ (inline or   │  output ring    │ (render)     │
//! └──────────────────┘  (SPSC)         │  own thread) │  (SPSC)         └──────────────┘
//!                                      └──────────────┘
//! ```
//!
//! Both rings are `rtrb` wait-free single-producer single-consumer queues
//! allocated once when the session is created. The audio side only ever
//! touches the output ring consumer.

mod filters;
mod ring;
mod thread;

use crate::config::EngineSimConfig;

pub use filters::{DcBlocker, ExhaustConvolver, NoiseSource, Resampler};
pub use ring::{InputWriter, OutputReader, ReadOutcome};
pub use thread::SynthesisThread;

/// Interleaved channels in every rendered frame.
pub const OUTPUT_CHANNELS: usize = 2;

/// Gain applied to the exhaust flow before mixing.
const INPUT_GAIN: f32 = 0.8;

/// Turns exhaust-flow samples into output frames.
pub struct Synthesizer {
    input: rtrb::Consumer<f32>,
    output: rtrb::Producer<f32>,
    dc: DcBlocker,
    convolver: ExhaustConvolver,
    noise: NoiseSource,
    volume: f32,
    convolution_level: f32,
    air_noise: f32,
}

/// Allocate the rings and DSP state for a session.
pub fn create_pipeline(config: &EngineSimConfig) -> (InputWriter, Synthesizer, OutputReader) {
    let (input_tx, input_rx) = rtrb::RingBuffer::<f32>::new(config.input_buffer_size as usize);
    let output_samples = config.audio_buffer_size as usize * OUTPUT_CHANNELS;
    let (output_tx, output_rx) = rtrb::RingBuffer::<f32>::new(output_samples);

    log::debug!(
        "Synthesizer rings: input {} samples, output {} frames, target lead {} frames",
        config.input_buffer_size,
        config.audio_buffer_size,
        config.target_latency_frames()
    );

    let synthesizer = Synthesizer {
        input: input_rx,
        output: output_tx,
        dc: DcBlocker::new(0.995),
        convolver: ExhaustConvolver::new(config.sample_rate),
        noise: NoiseSource::new(0x9E37_79B9),
        volume: config.volume,
        convolution_level: config.convolution_level,
        air_noise: config.air_noise,
    };

    (
        InputWriter::new(input_tx),
        synthesizer,
        OutputReader::new(output_rx, config.target_latency_frames()),
    )
}

impl Synthesizer {
    /// Process as many pending input samples as the output ring can take.
    ///
    /// Returns the number of frames written.
    pub fn process_pending(&mut self) -> usize {
        let frames = self
            .input
            .slots()
            .min(self.output.slots() / OUTPUT_CHANNELS);

        for _ in 0..frames {
            let Ok(x) = self.input.pop() else { break };
            let y = self.process_sample(x);
            // Room for both channels was checked above
            let _ = self.output.push(y);
            let _ = self.output.push(y);
        }
        frames
    }

    /// Frames waiting in the output ring.
    pub fn queued_frames(&self) -> usize {
        (self.output.buffer().capacity() - self.output.slots()) / OUTPUT_CHANNELS
    }

    #[inline]
    fn process_sample(&mut self, flow: f32) -> f32 {
        let dry = self.dc.process(flow * INPUT_GAIN);
        let wet = self.convolver.process(dry) * 4.0;
        let mixed = dry * (1.0 - self.convolution_level) + wet * self.convolution_level;
        let air = self.noise.sample() * self.air_noise * 0.25 * (0.2 + flow.abs().min(1.0));
        ((mixed + air) * self.volume).tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_flow(writer: &mut InputWriter, n: usize, value: f32) {
        for _ in 0..n {
            assert!(writer.push(value));
        }
    }

    #[test]
    fn test_pipeline_moves_samples_through() {
        let config = EngineSimConfig::low_latency();
        let (mut writer, mut synth, mut reader) = create_pipeline(&config);

        push_flow(&mut writer, 300, 0.5);
        assert_eq!(synth.process_pending(), 300);
        assert_eq!(synth.queued_frames(), 300);

        let mut out = vec![0.0; 256 * OUTPUT_CHANNELS];
        assert_eq!(reader.read_into(&mut out), ReadOutcome::Filled);
        assert!(out.iter().any(|s| *s != 0.0));
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        // Left and right carry the same signal
        assert!(out.chunks(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn test_process_pending_respects_output_space() {
        let config = EngineSimConfig {
            input_buffer_size: 64,
            audio_buffer_size: 24000,
            ..EngineSimConfig::low_latency()
        };
        let (mut writer, mut synth, _reader) = create_pipeline(&config);

        let mut written = 0;
        while written < 24000 {
            while writer.push(0.1) {}
            let frames = synth.process_pending();
            assert!(frames > 0);
            written += frames;
        }
        assert_eq!(synth.queued_frames(), 24000);

        // Output ring is full: pending input stays queued
        while writer.push(0.1) {}
        assert_eq!(synth.process_pending(), 0);
        assert!(!writer.push(0.1));
    }

    #[test]
    fn test_silent_mix_is_silent() {
        let config = EngineSimConfig {
            volume: 0.0,
            ..EngineSimConfig::low_latency()
        };
        let (mut writer, mut synth, mut reader) = create_pipeline(&config);

        push_flow(&mut writer, 128, 1.0);
        synth.process_pending();

        let mut out = vec![1.0; 128 * OUTPUT_CHANNELS];
        assert_eq!(reader.read_into(&mut out), ReadOutcome::Filled);
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
