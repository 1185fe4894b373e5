//! File-backed audio source
//!
//! Files are decoded and resampled completely at construction time, so
//! the resulting source is just a cursor over a frame vector and is
//! trivially real-time safe. All failure modes (missing file, unsupported
//! codec, resampler setup) surface before playback starts.

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::Sample;

use super::Source;

/// Errors from opening and decoding an audio file
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("file contains no decodable audio track")]
    NoAudioTrack,

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("channel count must be at least 1")]
    InvalidChannelCount,
}

/// A source backed by fully decoded frames, optionally looping.
///
/// Pulling past the end of a non-looping source returns a short count on
/// the final pull and zero afterwards.
pub struct DecoderSource {
    frames: Vec<Sample>,
    channels: usize,
    position: usize,
    looping: bool,
    exhausted: bool,
}

impl DecoderSource {
    /// Decode `path`, converting to `channels` channels and resampling to
    /// `sample_rate`. The whole file is held in memory.
    pub fn open<P: AsRef<Path>>(
        path: P,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, DecodeError> {
        if channels == 0 {
            return Err(DecodeError::InvalidChannelCount);
        }
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DecodeError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let src_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::UnsupportedFormat("unknown sample rate".into()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

        let mut interleaved: Vec<Sample> = Vec::new();
        let mut src_channels = 0usize;
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                // EOF surfaces as an IoError; anything decoded so far is
                // the whole file.
                Err(symphonia::core::errors::Error::IoError(_)) => break,
                Err(symphonia::core::errors::Error::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }
            match decoder.decode(&packet) {
                Ok(decoded) => {
                    if sample_buf.is_none() {
                        let spec = *decoded.spec();
                        src_channels = spec.channels.count();
                        sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }
                    if let Some(buf) = &mut sample_buf {
                        buf.copy_interleaved_ref(decoded);
                        interleaved.extend_from_slice(buf.samples());
                    }
                }
                // A corrupt packet is skipped, not fatal
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    log::warn!("skipping undecodable packet in {}: {e}", path.display());
                }
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            }
        }

        if src_channels == 0 || interleaved.is_empty() {
            return Err(DecodeError::NoAudioTrack);
        }

        let channels = channels as usize;
        let mut frames = convert_channels(&interleaved, src_channels, channels);
        if src_rate != sample_rate {
            log::debug!(
                "resampling {} from {src_rate} Hz to {sample_rate} Hz",
                path.display()
            );
            frames = resample(&frames, channels, src_rate, sample_rate)?;
        }

        log::info!(
            "decoded {}: {} frames, {channels} ch @ {sample_rate} Hz",
            path.display(),
            frames.len() / channels
        );

        Ok(Self {
            frames,
            channels,
            position: 0,
            looping: false,
            exhausted: false,
        })
    }

    /// Build a source from already decoded interleaved frames
    pub fn from_frames(frames: Vec<Sample>, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        debug_assert_eq!(frames.len() % channels, 0);
        Self {
            frames,
            channels,
            position: 0,
            looping: false,
            exhausted: false,
        }
    }

    /// When looping, playback wraps to the start instead of exhausting
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        if looping {
            self.exhausted = false;
        }
    }

    /// Total decoded frame count
    pub fn len_frames(&self) -> usize {
        self.frames.len() / self.channels
    }
}

impl Source for DecoderSource {
    fn pull(&mut self, out: &mut [Sample]) -> usize {
        let want = out.len() / self.channels;
        let mut written = 0usize;

        while written < want {
            let available = (self.frames.len() - self.position) / self.channels;
            if available == 0 {
                if self.looping && !self.frames.is_empty() {
                    self.position = 0;
                    continue;
                }
                self.exhausted = true;
                break;
            }
            let n = available.min(want - written);
            let src = &self.frames[self.position..self.position + n * self.channels];
            out[written * self.channels..(written + n) * self.channels].copy_from_slice(src);
            self.position += n * self.channels;
            written += n;
        }
        written
    }

    fn channels(&self) -> u16 {
        self.channels as u16
    }

    fn exhausted(&self) -> bool {
        self.exhausted
    }

    fn reset(&mut self) {
        self.position = 0;
        self.exhausted = false;
    }
}

/// Remap interleaved frames between channel counts: mono fans out to all
/// output channels, multichannel folds down to mono by averaging, and
/// other combinations copy matching channels (repeating the last source
/// channel when the output is wider).
fn convert_channels(src: &[Sample], src_channels: usize, dst_channels: usize) -> Vec<Sample> {
    if src_channels == dst_channels {
        return src.to_vec();
    }
    let frames = src.len() / src_channels;
    let mut out = vec![0.0; frames * dst_channels];

    for frame in 0..frames {
        let input = &src[frame * src_channels..(frame + 1) * src_channels];
        let output = &mut out[frame * dst_channels..(frame + 1) * dst_channels];
        if src_channels == 1 {
            output.fill(input[0]);
        } else if dst_channels == 1 {
            output[0] = input.iter().sum::<f32>() / src_channels as f32;
        } else {
            for (ch, o) in output.iter_mut().enumerate() {
                *o = input[ch.min(src_channels - 1)];
            }
        }
    }
    out
}

/// Offline sinc resampling of interleaved frames
fn resample(
    src: &[Sample],
    channels: usize,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Sample>, DecodeError> {
    const CHUNK: usize = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        CHUNK,
        channels,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;

    // Deinterleave into the planar layout rubato works in
    let frames = src.len() / channels;
    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for frame in src.chunks_exact(channels) {
        for (ch, &s) in frame.iter().enumerate() {
            planar[ch].push(s);
        }
    }

    let mut out_planar: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut position = 0usize;
    while position + CHUNK <= frames {
        let input: Vec<&[f32]> = planar.iter().map(|c| &c[position..position + CHUNK]).collect();
        let chunk_out = resampler
            .process(&input, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        for (ch, data) in chunk_out.into_iter().enumerate() {
            out_planar[ch].extend(data);
        }
        position += CHUNK;
    }
    if position < frames {
        let input: Vec<&[f32]> = planar.iter().map(|c| &c[position..]).collect();
        let chunk_out = resampler
            .process_partial(Some(&input), None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        for (ch, data) in chunk_out.into_iter().enumerate() {
            out_planar[ch].extend(data);
        }
    }

    // Re-interleave
    let out_frames = out_planar[0].len();
    let mut out = vec![0.0; out_frames * channels];
    for frame in 0..out_frames {
        for ch in 0..channels {
            out[frame * channels + ch] = out_planar[ch][frame];
        }
    }
    Ok(out)
}
