//! Periodic waveform generators

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::engine::{MixError, MixResult};
use crate::types::Sample;

use super::Source;

/// Waveform shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

/// Waveform source parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformConfig {
    pub channels: u16,
    pub sample_rate: u32,
    pub shape: Waveform,
    /// Linear output amplitude
    pub amplitude: f32,
    /// Oscillation frequency in Hz
    pub frequency: f64,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: crate::types::DEFAULT_SAMPLE_RATE,
            shape: Waveform::Sine,
            amplitude: 1.0,
            frequency: 440.0,
        }
    }
}

/// An infinite oscillator. The same value is written to every channel of
/// a frame; phase is tracked in f64 so long renders do not drift.
pub struct WaveformSource {
    channels: usize,
    sample_rate: u32,
    shape: Waveform,
    amplitude: f32,
    frequency: f64,
    /// Normalized phase in [0, 1)
    phase: f64,
}

impl WaveformSource {
    pub fn new(config: WaveformConfig) -> MixResult<Self> {
        if config.channels == 0 {
            return Err(MixError::InvalidChannelCount);
        }
        if config.sample_rate == 0 {
            return Err(MixError::InvalidSampleRate);
        }
        // Below Nyquist keeps the per-frame phase step under 0.5, so the
        // single wrap in `pull` is enough.
        if !(config.frequency > 0.0 && config.frequency < config.sample_rate as f64 / 2.0) {
            return Err(MixError::InvalidEffectConfig(
                "waveform frequency must be positive and below Nyquist",
            ));
        }
        Ok(Self {
            channels: config.channels as usize,
            sample_rate: config.sample_rate,
            shape: config.shape,
            amplitude: config.amplitude.max(0.0),
            frequency: config.frequency,
            phase: 0.0,
        })
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude.max(0.0);
    }

    /// Change the frequency without resetting phase (no click). Values
    /// outside (0, Nyquist) are ignored.
    pub fn set_frequency(&mut self, frequency: f64) {
        if frequency > 0.0 && frequency < self.sample_rate as f64 / 2.0 {
            self.frequency = frequency;
        }
    }

    #[inline]
    fn sample_at(&self, phase: f64) -> f32 {
        let v = match self.shape {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        };
        v as f32 * self.amplitude
    }
}

impl Source for WaveformSource {
    fn pull(&mut self, out: &mut [Sample]) -> usize {
        let frames = out.len() / self.channels;
        let step = self.frequency / self.sample_rate as f64;
        for frame in 0..frames {
            let s = self.sample_at(self.phase);
            for ch in 0..self.channels {
                out[frame * self.channels + ch] = s;
            }
            self.phase += step;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
        frames
    }

    fn channels(&self) -> u16 {
        self.channels as u16
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f64) -> WaveformSource {
        WaveformSource::new(WaveformConfig {
            channels: 2,
            sample_rate: 48000,
            shape: Waveform::Sine,
            amplitude: 0.5,
            frequency,
        })
        .unwrap()
    }

    #[test]
    fn test_phase_continuity_across_pulls() {
        // Two pulls of 100 + 150 frames must equal one pull of 250
        let mut split = sine(440.0);
        let mut whole = sine(440.0);

        let mut a = vec![0.0; 250 * 2];
        split.pull(&mut a[..100 * 2]);
        let (_, tail) = a.split_at_mut(100 * 2);
        split.pull(tail);

        let mut b = vec![0.0; 250 * 2];
        whole.pull(&mut b);

        assert_eq!(a, b);
    }

    #[test]
    fn test_all_channels_carry_same_value() {
        let mut src = sine(220.0);
        let mut out = vec![0.0; 64 * 2];
        src.pull(&mut out);
        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_square_alternates_at_amplitude() {
        let mut src = WaveformSource::new(WaveformConfig {
            channels: 1,
            sample_rate: 48000,
            shape: Waveform::Square,
            amplitude: 0.25,
            frequency: 12000.0,
        })
        .unwrap();
        let mut out = vec![0.0; 8];
        src.pull(&mut out);
        assert_eq!(out, [0.25, 0.25, -0.25, -0.25, 0.25, 0.25, -0.25, -0.25]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(WaveformSource::new(WaveformConfig {
            frequency: 0.0,
            ..WaveformConfig::default()
        })
        .is_err());
        assert!(WaveformSource::new(WaveformConfig {
            sample_rate: 0,
            ..WaveformConfig::default()
        })
        .is_err());
        // At or above Nyquist the phase step would exceed the single wrap
        assert!(WaveformSource::new(WaveformConfig {
            frequency: 24000.0,
            ..WaveformConfig::default()
        })
        .is_err());
        assert!(WaveformSource::new(WaveformConfig {
            frequency: f64::NAN,
            ..WaveformConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_set_frequency_ignores_out_of_range() {
        let mut src = WaveformSource::new(WaveformConfig {
            channels: 1,
            sample_rate: 48000,
            shape: Waveform::Sawtooth,
            amplitude: 1.0,
            frequency: 23999.0,
        })
        .unwrap();
        src.set_frequency(48000.0);
        src.set_frequency(-1.0);

        // Still running just below Nyquist; phase stays wrapped and the
        // output stays within the amplitude envelope
        let mut out = vec![0.0; 48000];
        src.pull(&mut out);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_never_exhausts() {
        let mut src = sine(440.0);
        let mut out = vec![0.0; 2 * 4096];
        for _ in 0..100 {
            assert_eq!(src.pull(&mut out), 4096);
        }
        assert!(!src.exhausted());
    }
}
