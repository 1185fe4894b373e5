//! Audio sources
//!
//! A source is anything the mixer can pull interleaved f32 frames from.
//! Pulling returns the frame count actually produced; a short count means
//! the source has nothing more (checked via [`Source::exhausted`]), and
//! the mixer treats the shortfall as silence rather than an error.

use crate::types::Sample;

mod decoder;
mod noise;
mod waveform;

pub use decoder::{DecodeError, DecoderSource};
pub use noise::{NoiseColor, NoiseConfig, NoiseSource};
pub use waveform::{Waveform, WaveformConfig, WaveformSource};

/// A pull-based producer of interleaved audio frames.
///
/// Implementations must be real-time safe once constructed: `pull` may
/// not allocate, block, or perform I/O.
pub trait Source: Send {
    /// Fill `out` with up to `out.len() / channels` interleaved frames,
    /// returning the number of frames produced. Frames past the returned
    /// count are left untouched.
    fn pull(&mut self, out: &mut [Sample]) -> usize;

    /// Interleaved channel count of the produced frames
    fn channels(&self) -> u16;

    /// Whether the source has permanently run out of frames. Infinite
    /// generators never report true.
    fn exhausted(&self) -> bool {
        false
    }

    /// Rewind to the start, clearing any exhaustion
    fn reset(&mut self) {}
}
