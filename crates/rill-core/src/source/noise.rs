//! Noise generators

use serde::{Deserialize, Serialize};

use crate::engine::{MixError, MixResult};
use crate::types::Sample;

use super::Source;

/// Spectral character of the generated noise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoiseColor {
    /// Flat spectrum
    #[default]
    White,
    /// Integrated white noise, -6 dB per octave
    Brownian,
}

/// Noise source parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub channels: u16,
    pub color: NoiseColor,
    /// Linear output amplitude
    pub amplitude: f32,
    /// Fixed seed for reproducible output; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            color: NoiseColor::White,
            amplitude: 1.0,
            seed: None,
        }
    }
}

/// An infinite noise generator with an independent stream per channel
pub struct NoiseSource {
    channels: usize,
    color: NoiseColor,
    amplitude: f32,
    rng: fastrand::Rng,
    /// Per-channel integrator state for brownian noise
    state: Vec<f32>,
}

impl NoiseSource {
    pub fn new(config: NoiseConfig) -> MixResult<Self> {
        if config.channels == 0 {
            return Err(MixError::InvalidChannelCount);
        }
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Ok(Self {
            channels: config.channels as usize,
            color: config.color,
            amplitude: config.amplitude.max(0.0),
            rng,
            state: vec![0.0; config.channels as usize],
        })
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude.max(0.0);
    }

    #[inline]
    fn white(&mut self) -> f32 {
        self.rng.f32() * 2.0 - 1.0
    }
}

impl Source for NoiseSource {
    fn pull(&mut self, out: &mut [Sample]) -> usize {
        let frames = out.len() / self.channels;
        match self.color {
            NoiseColor::White => {
                for s in &mut out[..frames * self.channels] {
                    *s = self.white() * self.amplitude;
                }
            }
            NoiseColor::Brownian => {
                for frame in 0..frames {
                    for ch in 0..self.channels {
                        // Leaky integrator; the divisor keeps the walk from
                        // drifting unbounded, the 0.1 rescales its energy
                        // back into the nominal amplitude range.
                        let s = (self.state[ch] + self.white()) / 1.005;
                        self.state[ch] = s;
                        out[frame * self.channels + ch] = s * self.amplitude * 0.1;
                    }
                }
            }
        }
        frames
    }

    fn channels(&self) -> u16 {
        self.channels as u16
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
    }
}
