//! Common types for Rill
//!
//! This module contains the fundamental audio types used throughout the
//! mixing engine: the f32 working sample format, device sample encodings,
//! and the fixed-capacity interleaved accumulation buffer.

use serde::{Deserialize, Serialize};

/// Audio sample type for all internal processing (wide enough to sum
/// multiple sources before the final conversion at the device boundary).
pub type Sample = f32;

/// Default sample rate used when no device rate is available (48kHz -
/// standard professional audio rate). The actual rate must be read back
/// from the device before a graph is built.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Sample encodings the engine can deliver to a playback device.
///
/// Internal mixing is always `f32`; these describe the conversion applied
/// when the root bus writes into the hardware buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Unsigned 8-bit (biased around 128)
    U8,
    /// Signed 16-bit
    I16,
    /// Signed 32-bit
    I32,
    /// 32-bit float
    #[default]
    F32,
}

impl SampleFormat {
    /// Size of one sample in bytes
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I32 | SampleFormat::F32 => 4,
        }
    }

    /// Size of one interleaved frame in bytes
    pub fn bytes_per_frame(&self, channels: u16) -> usize {
        self.bytes_per_sample() * channels as usize
    }
}

/// A concrete device sample type the working format can be converted into.
///
/// Implemented for the sample types a playback stream can be opened with.
/// Conversion clamps to the [-1, 1] working range first, so an overdriven
/// mix clips instead of wrapping.
pub trait OutputSample: Copy + Send + 'static {
    /// The encoding this type corresponds to
    const FORMAT: SampleFormat;

    /// Convert one working-format sample
    fn from_sample(s: Sample) -> Self;
}

impl OutputSample for u8 {
    const FORMAT: SampleFormat = SampleFormat::U8;

    #[inline]
    fn from_sample(s: Sample) -> Self {
        let v = (s.clamp(-1.0, 1.0) * 128.0 + 128.0) as i32;
        v.clamp(0, 255) as u8
    }
}

impl OutputSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::I16;

    #[inline]
    fn from_sample(s: Sample) -> Self {
        (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }
}

impl OutputSample for i32 {
    const FORMAT: SampleFormat = SampleFormat::I32;

    #[inline]
    fn from_sample(s: Sample) -> Self {
        (s.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
    }
}

impl OutputSample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;

    #[inline]
    fn from_sample(s: Sample) -> Self {
        s
    }
}

/// Fixed-capacity buffer of interleaved working-format samples.
///
/// Allocated once at construction and never resized afterwards; every
/// operation works on a frame-count prefix of the buffer. This is what
/// bounds worst-case callback latency: a negotiation pass can never ask
/// for more frames than were provisioned up front.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: Vec<Sample>,
    channels: usize,
    capacity_frames: usize,
}

impl FrameBuffer {
    /// Create a buffer holding up to `capacity_frames` interleaved frames
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        Self {
            data: vec![0.0; capacity_frames * channels],
            channels,
            capacity_frames,
        }
    }

    /// Maximum number of frames the buffer can hold
    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Number of interleaved channels per frame
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Zero the first `frames` frames
    pub fn silence_frames(&mut self, frames: usize) {
        debug_assert!(frames <= self.capacity_frames);
        self.data[..frames * self.channels].fill(0.0);
    }

    /// View of the first `frames` frames as an interleaved slice
    #[inline]
    pub fn frames(&self, frames: usize) -> &[Sample] {
        &self.data[..frames * self.channels]
    }

    /// Mutable view of the first `frames` frames as an interleaved slice
    #[inline]
    pub fn frames_mut(&mut self, frames: usize) -> &mut [Sample] {
        &mut self.data[..frames * self.channels]
    }

    /// Add `src` (interleaved, whole frames) into the buffer starting at
    /// `offset_frames`, scaled by `gain`. Summing, not overwriting - this
    /// is the accumulation step of the mix.
    pub fn accumulate_at(&mut self, offset_frames: usize, src: &[Sample], gain: f32) {
        debug_assert_eq!(src.len() % self.channels, 0);
        let start = offset_frames * self.channels;
        debug_assert!(start + src.len() <= self.data.len());
        for (dst, s) in self.data[start..start + src.len()].iter_mut().zip(src) {
            *dst += s * gain;
        }
    }

    /// Scale the first `frames` frames by `gain`
    pub fn scale_frames(&mut self, frames: usize, gain: f32) {
        if gain == 1.0 {
            return;
        }
        for s in &mut self.data[..frames * self.channels] {
            *s *= gain;
        }
    }

    /// Convert and write the first `frames` frames into a device buffer,
    /// overwriting whatever was there.
    pub fn write_to<T: OutputSample>(&self, out: &mut [T], frames: usize) {
        let n = frames * self.channels;
        debug_assert!(out.len() >= n);
        for (dst, &s) in out[..n].iter_mut().zip(&self.data[..n]) {
            *dst = T::from_sample(s);
        }
    }

    /// Peak absolute amplitude over the first `frames` frames
    pub fn peak(&self, frames: usize) -> Sample {
        self.data[..frames * self.channels]
            .iter()
            .map(|s| s.abs())
            .fold(0.0, Sample::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_sizes() {
        assert_eq!(SampleFormat::U8.bytes_per_frame(2), 2);
        assert_eq!(SampleFormat::I16.bytes_per_frame(2), 4);
        assert_eq!(SampleFormat::F32.bytes_per_frame(2), 8);
    }

    #[test]
    fn test_output_sample_conversion() {
        assert_eq!(u8::from_sample(0.0), 128);
        assert_eq!(u8::from_sample(1.0), 255);
        assert_eq!(u8::from_sample(-1.0), 0);

        assert_eq!(i16::from_sample(0.0), 0);
        assert_eq!(i16::from_sample(1.0), i16::MAX);

        // Over-range input clips instead of wrapping
        assert_eq!(i16::from_sample(2.0), i16::MAX);
        assert_eq!(i16::from_sample(-2.0), -i16::MAX);

        assert_eq!(f32::from_sample(0.25), 0.25);
    }

    #[test]
    fn test_frame_buffer_accumulate() {
        let mut buf = FrameBuffer::new(4, 2);
        buf.accumulate_at(0, &[1.0, 2.0, 3.0, 4.0], 1.0);
        buf.accumulate_at(0, &[1.0, 1.0, 1.0, 1.0], 0.5);

        assert_eq!(buf.frames(2), &[1.5, 2.5, 3.5, 4.5]);
        // Frames past the accumulated region stay silent
        assert_eq!(buf.frames(4)[4..], [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_frame_buffer_offset_accumulate() {
        let mut buf = FrameBuffer::new(4, 2);
        buf.accumulate_at(2, &[1.0, 1.0], 1.0);
        assert_eq!(buf.frames(4), &[0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_frame_buffer_scale_and_silence() {
        let mut buf = FrameBuffer::new(4, 2);
        buf.accumulate_at(0, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0], 1.0);
        buf.scale_frames(2, 0.5);
        assert_eq!(buf.frames(4), &[0.5, 0.5, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0]);

        buf.silence_frames(4);
        assert_eq!(buf.peak(4), 0.0);
    }

    #[test]
    fn test_frame_buffer_write_to() {
        let mut buf = FrameBuffer::new(2, 2);
        buf.accumulate_at(0, &[0.0, 1.0, -1.0, 0.5], 1.0);

        let mut out = [0u8; 4];
        buf.write_to(&mut out, 2);
        assert_eq!(out, [128, 255, 0, 192]);
    }
}
