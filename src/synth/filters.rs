//! Small DSP blocks used by the synthesizer.

use std::f32::consts::TAU;

/// One-pole DC blocking filter.
#[derive(Debug, Clone)]
pub struct DcBlocker {
    pole: f32,
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub fn new(pole: f32) -> Self {
        Self {
            pole,
            x1: 0.0,
            y1: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + self.pole * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// Direct-form FIR convolution with a synthetic exhaust-pipe response.
///
/// The history is stored twice so the newest `len` samples are always one
/// contiguous slice.
#[derive(Debug, Clone)]
pub struct ExhaustConvolver {
    /// Impulse response, oldest tap first
    taps: Vec<f32>,
    history: Vec<f32>,
    pos: usize,
}

impl ExhaustConvolver {
    /// Length of the response in seconds.
    const RESPONSE_SECONDS: f32 = 0.006;
    /// Resonance of the pipe in Hz.
    const PIPE_RESONANCE: f32 = 140.0;
    /// Decay time constant in seconds.
    const DECAY: f32 = 0.0015;

    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let len = ((Self::RESPONSE_SECONDS * sr).round() as usize).max(1);

        let mut response: Vec<f32> = (0..len)
            .map(|k| {
                let t = k as f32 / sr;
                (-t / Self::DECAY).exp() * (TAU * Self::PIPE_RESONANCE * t).cos()
            })
            .collect();

        let norm: f32 = response.iter().map(|h| h.abs()).sum();
        if norm > 0.0 {
            response.iter_mut().for_each(|h| *h /= norm);
        }
        // Dot products run oldest-to-newest, so store the response reversed
        response.reverse();

        Self {
            taps: response,
            history: vec![0.0; 2 * len],
            pos: 0,
        }
    }

    pub fn taps(&self) -> usize {
        self.taps.len()
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let len = self.taps.len();
        self.history[self.pos] = x;
        self.history[self.pos + len] = x;
        self.pos = (self.pos + 1) % len;

        let window = &self.history[self.pos..self.pos + len];
        window.iter().zip(&self.taps).map(|(s, h)| s * h).sum()
    }
}

/// Xorshift white noise in [-1, 1].
#[derive(Debug, Clone)]
pub struct NoiseSource {
    state: u32,
}

impl NoiseSource {
    pub fn new(seed: u32) -> Self {
        Self { state: seed.max(1) }
    }

    #[inline]
    pub fn sample(&mut self) -> f32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

/// Linear resampler from the simulation rate to the audio rate.
#[derive(Debug, Clone)]
pub struct Resampler {
    /// Input samples per output sample
    step: f64,
    /// Position of the next output between the previous and next input
    next: f64,
    prev: f64,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            step: input_rate as f64 / output_rate as f64,
            next: 0.0,
            prev: 0.0,
        }
    }

    /// Feed one input sample, emitting every output sample that falls
    /// between it and the previous one.
    #[inline]
    pub fn push(&mut self, value: f64, mut emit: impl FnMut(f32)) {
        while self.next < 1.0 {
            emit((self.prev + (value - self.prev) * self.next) as f32);
            self.next += self.step;
        }
        self.next -= 1.0;
        self.prev = value;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_dc_blocker_removes_offset() {
        let mut dc = DcBlocker::new(0.995);
        let mut y = 0.0;
        for _ in 0..10_000 {
            y = dc.process(1.0);
        }
        assert!(y.abs() < 1e-3);
    }

    #[test]
    fn test_convolver_response_is_normalized() {
        let mut conv = ExhaustConvolver::new(48000);
        assert_eq!(conv.taps(), 288);

        // Feeding an impulse replays the response, whose absolute sum is 1
        let mut total = conv.process(1.0).abs();
        for _ in 1..conv.taps() {
            total += conv.process(0.0).abs();
        }
        assert_relative_eq!(total, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_noise_range() {
        let mut noise = NoiseSource::new(7);
        for _ in 0..10_000 {
            let n = noise.sample();
            assert!((-1.0..=1.0).contains(&n));
        }
    }

    #[test]
    fn test_resampler_output_count() {
        let mut resampler = Resampler::new(10_000, 48_000);
        let mut count = 0;
        for i in 0..10_000 {
            resampler.push(i as f64, |_| count += 1);
        }
        // One second of input yields one second of output
        assert!((47_999..=48_001).contains(&count), "got {count}");
    }

    #[test]
    fn test_resampler_interpolates() {
        let mut resampler = Resampler::new(1, 4);
        let mut out = Vec::new();
        resampler.push(0.0, |s| out.push(s));
        resampler.push(1.0, |s| out.push(s));
        assert_eq!(out.len(), 8);
        assert_relative_eq!(out[4], 0.0);
        assert_relative_eq!(out[5], 0.25);
        assert_relative_eq!(out[7], 0.75);
    }
}
