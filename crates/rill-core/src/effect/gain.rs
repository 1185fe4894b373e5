//! Static gain effect

use crate::types::Sample;

use super::Effect;

/// Multiplies every sample by a fixed linear gain. Mostly useful for
/// wiring tests and as the simplest possible 1:1 effect.
pub struct GainEffect {
    channels: u16,
    gain: f32,
}

impl GainEffect {
    pub fn new(channels: u16, gain: f32) -> Self {
        Self {
            channels,
            gain: gain.max(0.0),
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.max(0.0);
    }
}

impl Effect for GainEffect {
    fn process(&mut self, buffer: &mut [Sample], frames_in: usize, _frames_out: usize) -> usize {
        for s in &mut buffer[..frames_in * self.channels as usize] {
            *s *= self.gain;
        }
        frames_in
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scales_in_place() {
        let mut fx = GainEffect::new(2, 0.5);
        let mut buf = vec![1.0f32, -1.0, 0.5, 0.5];
        assert_eq!(fx.process(&mut buf, 2, 2), 2);
        assert_eq!(buf, [0.5, -0.5, 0.25, 0.25]);
    }
}
