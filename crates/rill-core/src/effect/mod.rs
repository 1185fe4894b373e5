//! Bus effects
//!
//! An effect processes a bus's accumulated frames in place, once per
//! pass. Effects that consume more frames than they produce declare an
//! input:output ratio, which the bus folds into its frame negotiation.

use crate::types::Sample;

mod gain;
mod lowpass;

pub use gain::GainEffect;
pub use lowpass::{LowPassConfig, LowPassEffect};

/// A per-bus audio processor.
///
/// Implementations must be real-time safe once constructed: `process`
/// may not allocate, block, or perform I/O.
pub trait Effect: Send {
    /// Process `frames_in` interleaved frames in `buffer` in place,
    /// writing at most `frames_out` output frames from the front.
    /// Returns the frames actually produced.
    ///
    /// For 1:1 effects `frames_in == frames_out` and the return value is
    /// simply `frames_in`.
    fn process(&mut self, buffer: &mut [Sample], frames_in: usize, frames_out: usize) -> usize;

    /// Input frames consumed per output frame produced. Must be finite
    /// and positive; 1.0 for in-place effects.
    fn input_output_ratio(&self) -> f64 {
        1.0
    }

    /// Interleaved channel count the effect was built for
    fn channels(&self) -> u16;

    /// Clear internal state (filter histories etc.)
    fn reset(&mut self);
}
