//! Higher-order low-pass filter
//!
//! Cascaded RBJ biquad stages with Butterworth Q values, so an order-8
//! filter is four second-order sections and a 48 dB/octave rolloff.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::engine::{MixError, MixResult};
use crate::types::Sample;

use super::Effect;

/// Low-pass filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowPassConfig {
    pub channels: u16,
    pub sample_rate: u32,
    /// -3 dB point in Hz; must sit below Nyquist
    pub cutoff_hz: f32,
    /// Filter order; even, between 2 and 8
    pub order: usize,
}

impl Default for LowPassConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: crate::types::DEFAULT_SAMPLE_RATE,
            cutoff_hz: 1000.0,
            order: 2,
        }
    }
}

/// Direct form I biquad coefficients
#[derive(Debug, Clone, Copy)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    /// RBJ cookbook low-pass
    fn lowpass(sample_rate: u32, cutoff_hz: f32, q: f32) -> Self {
        let omega = 2.0 * PI * cutoff_hz / sample_rate as f32;
        let (sin_w, cos_w) = omega.sin_cos();
        let alpha = sin_w / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 - cos_w) / 2.0) / a0,
            b1: (1.0 - cos_w) / a0,
            b2: ((1.0 - cos_w) / 2.0) / a0,
            a1: (-2.0 * cos_w) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// Per-channel biquad delay line
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    fn tick(&mut self, c: &BiquadCoeffs, x: f32) -> f32 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// A 1:1 in-place low-pass effect
pub struct LowPassEffect {
    channels: usize,
    coeffs: Vec<BiquadCoeffs>,
    /// One delay line per (stage, channel)
    states: Vec<BiquadState>,
}

impl LowPassEffect {
    pub fn new(config: LowPassConfig) -> MixResult<Self> {
        if config.channels == 0 {
            return Err(MixError::InvalidChannelCount);
        }
        if config.sample_rate == 0 {
            return Err(MixError::InvalidSampleRate);
        }
        if !(config.cutoff_hz > 0.0 && config.cutoff_hz < config.sample_rate as f32 / 2.0) {
            return Err(MixError::InvalidEffectConfig(
                "cutoff must be positive and below Nyquist",
            ));
        }
        if config.order < 2 || config.order > 8 || config.order % 2 != 0 {
            return Err(MixError::InvalidEffectConfig("order must be 2, 4, 6 or 8"));
        }

        // Butterworth Q per second-order section
        let stages = config.order / 2;
        let coeffs = (0..stages)
            .map(|k| {
                let q = 1.0
                    / (2.0 * (PI * (2 * k + 1) as f32 / (2.0 * config.order as f32)).cos());
                BiquadCoeffs::lowpass(config.sample_rate, config.cutoff_hz, q)
            })
            .collect::<Vec<_>>();

        Ok(Self {
            channels: config.channels as usize,
            states: vec![BiquadState::default(); stages * config.channels as usize],
            coeffs,
        })
    }
}

impl Effect for LowPassEffect {
    fn process(&mut self, buffer: &mut [Sample], frames_in: usize, _frames_out: usize) -> usize {
        for frame in buffer[..frames_in * self.channels].chunks_exact_mut(self.channels) {
            for (ch, s) in frame.iter_mut().enumerate() {
                let mut v = *s;
                for (stage, c) in self.coeffs.iter().enumerate() {
                    v = self.states[stage * self.channels + ch].tick(c, v);
                }
                *s = v;
            }
        }
        frames_in
    }

    fn channels(&self) -> u16 {
        self.channels as u16
    }

    fn reset(&mut self) {
        self.states.fill(BiquadState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(cutoff_hz: f32, order: usize) -> LowPassEffect {
        LowPassEffect::new(LowPassConfig {
            channels: 1,
            sample_rate: 48000,
            cutoff_hz,
            order,
        })
        .unwrap()
    }

    /// RMS of a sine run through the filter, after letting it settle
    fn response_at(filter: &mut LowPassEffect, freq: f32) -> f32 {
        let n = 4800;
        let mut buf: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 48000.0).sin())
            .collect();
        filter.process(&mut buf, n, n);
        let tail = &buf[n / 2..];
        (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt()
    }

    #[test]
    fn test_passband_preserved_stopband_attenuated() {
        let mut f = filter(3000.0, 8);
        let low = response_at(&mut f, 100.0);
        let mut f = filter(3000.0, 8);
        let high = response_at(&mut f, 20000.0);

        // Unity RMS for a sine is 1/sqrt(2)
        assert!((low - 0.707).abs() < 0.05, "passband rms {low}");
        assert!(high < 0.01, "stopband rms {high}");
    }

    #[test]
    fn test_higher_order_rolls_off_harder() {
        let mut f2 = filter(1000.0, 2);
        let mut f8 = filter(1000.0, 8);
        let at_4k_order2 = response_at(&mut f2, 4000.0);
        let at_4k_order8 = response_at(&mut f8, 4000.0);
        assert!(at_4k_order8 < at_4k_order2 / 10.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(LowPassEffect::new(LowPassConfig {
            order: 3,
            ..LowPassConfig::default()
        })
        .is_err());
        assert!(LowPassEffect::new(LowPassConfig {
            cutoff_hz: 30000.0,
            ..LowPassConfig::default()
        })
        .is_err());
        assert!(LowPassEffect::new(LowPassConfig {
            cutoff_hz: 0.0,
            ..LowPassConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_reset_clears_history() {
        let mut f = filter(500.0, 4);
        let mut buf = vec![1.0f32; 256];
        f.process(&mut buf, 256, 256);

        f.reset();
        let mut silence = vec![0.0f32; 256];
        f.process(&mut silence, 256, 256);
        assert!(silence.iter().all(|&s| s == 0.0));
    }
}
