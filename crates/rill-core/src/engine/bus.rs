//! MixBus - one node of the mixing tree, and the begin/mix/end
//! negotiation protocol that drives it
//!
//! A bus owns a fixed-capacity accumulation buffer, a volume scalar, an
//! optional effect, and its inputs (sources and child buses). One pass
//! over a bus is the strict sequence:
//!
//! ```text
//! begin(requested)  ->  mix inputs for frames_in  ->  end into parent/device
//! ```
//!
//! `begin` is where all frame-count negotiation happens: the requested
//! output count is clamped to buffer capacity, and the effect's declared
//! input:output ratio determines how many pre-effect frames the inputs
//! must supply. Volume and the effect are applied exactly once per pass,
//! in `end`, never per input.

use crate::effect::Effect;
use crate::source::Source;
use crate::types::{FrameBuffer, OutputSample};

use super::error::{MixError, MixResult};

/// Accumulation buffer capacity used when nothing else is configured
/// (frames per negotiation pass)
pub const DEFAULT_BUS_CAPACITY: usize = 4096;

/// Identifier of a bus within a [`super::MixGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId(pub(crate) u32);

/// Identifier of a source slot on a particular bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) usize);

/// Outcome of a `begin` negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    /// Post-effect frames this pass will deliver to the caller
    pub frames_out: u64,
    /// Pre-effect frames the caller must mix into the bus before `end`
    pub frames_in: u64,
}

/// Per-pass protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Idle,
    Begun { frames_out: u64, frames_in: u64 },
}

/// A source attached to a bus, with its per-call mix volume
struct SourceSlot {
    source: Box<dyn Source>,
    volume: f32,
    /// Cleared automatically when the source reports exhaustion
    enabled: bool,
}

/// A node in the mixing tree
pub struct MixBus {
    pub(crate) id: BusId,
    channels: usize,
    sample_rate: u32,
    capacity: u64,
    volume: f32,
    effect: Option<Box<dyn Effect>>,
    /// Accumulation buffer; fully overwritten every pass
    accum: FrameBuffer,
    /// Pull staging for sources (sources write here, then get summed)
    scratch: FrameBuffer,
    state: BusState,
    children: Vec<MixBus>,
    sources: Vec<SourceSlot>,
}

impl MixBus {
    /// Create a bus with the given format and per-pass frame capacity.
    ///
    /// All buffers are allocated here; nothing grows afterwards.
    pub fn new(channels: u16, sample_rate: u32, capacity_frames: usize) -> MixResult<Self> {
        if channels == 0 {
            return Err(MixError::InvalidChannelCount);
        }
        if sample_rate == 0 {
            return Err(MixError::InvalidSampleRate);
        }
        if capacity_frames == 0 {
            return Err(MixError::InvalidCapacity);
        }
        let channels = channels as usize;
        Ok(Self {
            id: BusId(0),
            channels,
            sample_rate,
            capacity: capacity_frames as u64,
            volume: 1.0,
            effect: None,
            accum: FrameBuffer::new(capacity_frames, channels),
            scratch: FrameBuffer::new(capacity_frames, channels),
            state: BusState::Idle,
            children: Vec::new(),
            sources: Vec::new(),
        })
    }

    /// Number of interleaved channels
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Mix sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per negotiation pass
    pub fn capacity_frames(&self) -> usize {
        self.capacity as usize
    }

    /// Set the volume applied once at end-of-mix (clamped at 0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
    }

    /// Get the end-of-mix volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Attach an effect, replacing any previous one.
    ///
    /// Validates that the effect's channel count matches the bus and that
    /// the declared frame ratio still leaves room for at least one output
    /// frame per pass at this bus's capacity.
    pub fn set_effect(&mut self, effect: Box<dyn Effect>) -> MixResult<()> {
        if self.state != BusState::Idle {
            return Err(MixError::Protocol("effect swapped while a pass is in progress"));
        }
        if effect.channels() as usize != self.channels {
            return Err(MixError::ChannelMismatch {
                bus: self.channels,
                input: effect.channels() as usize,
            });
        }
        let ratio = effect.input_output_ratio();
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(MixError::InvalidEffectRatio(ratio));
        }
        if ((self.capacity as f64) / ratio).floor() < 1.0 {
            return Err(MixError::CapacityTooSmallForEffect {
                capacity: self.capacity,
                ratio,
            });
        }
        self.effect = Some(effect);
        Ok(())
    }

    /// Detach and return the current effect, if any
    pub fn take_effect(&mut self) -> Option<Box<dyn Effect>> {
        self.effect.take()
    }

    /// Attach a source with its mix volume, returning the slot id
    pub fn add_source(&mut self, source: Box<dyn Source>, volume: f32) -> MixResult<SourceId> {
        if source.channels() as usize != self.channels {
            return Err(MixError::ChannelMismatch {
                bus: self.channels,
                input: source.channels() as usize,
            });
        }
        self.sources.push(SourceSlot {
            source,
            volume: volume.max(0.0),
            enabled: true,
        });
        Ok(SourceId(self.sources.len() - 1))
    }

    /// Set the mix volume of an attached source
    pub fn set_source_volume(&mut self, id: SourceId, volume: f32) -> MixResult<()> {
        let slot = self.sources.get_mut(id.0).ok_or(MixError::UnknownSource(id.0))?;
        slot.volume = volume.max(0.0);
        Ok(())
    }

    /// Enable or disable an attached source (a disabled slot is skipped,
    /// and its source's playback position does not advance)
    pub fn set_source_enabled(&mut self, id: SourceId, enabled: bool) -> MixResult<()> {
        let slot = self.sources.get_mut(id.0).ok_or(MixError::UnknownSource(id.0))?;
        slot.enabled = enabled;
        Ok(())
    }

    /// Whether a source slot is currently enabled
    pub fn source_enabled(&self, id: SourceId) -> MixResult<bool> {
        self.sources
            .get(id.0)
            .map(|s| s.enabled)
            .ok_or(MixError::UnknownSource(id.0))
    }

    /// Attach a child bus whose output is mixed into this one.
    ///
    /// All buses in a tree must agree on channel count and sample rate.
    pub fn add_child(&mut self, child: MixBus) -> MixResult<()> {
        if child.channels != self.channels {
            return Err(MixError::ChannelMismatch {
                bus: self.channels,
                input: child.channels,
            });
        }
        if child.sample_rate != self.sample_rate {
            return Err(MixError::InvalidSampleRate);
        }
        self.children.push(child);
        Ok(())
    }

    pub(crate) fn find_mut(&mut self, id: BusId) -> Option<&mut MixBus> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Compute the frame counts for a pass without touching any state.
    ///
    /// The requested output is clamped to capacity; the effect ratio then
    /// determines the input count, with ceiling rounding so the effect is
    /// never starved. If even the ceiling overflows capacity, the output
    /// demand is clamped down instead.
    fn negotiate(&self, requested_out: u64) -> Negotiation {
        let mut frames_out = requested_out.min(self.capacity);
        let ratio = self.effect.as_ref().map_or(1.0, |e| e.input_output_ratio());
        let mut frames_in = if ratio == 1.0 {
            frames_out
        } else {
            (frames_out as f64 * ratio).ceil() as u64
        };
        if frames_in > self.capacity {
            frames_in = self.capacity;
            frames_out = ((self.capacity as f64) / ratio).floor() as u64;
        }
        Negotiation { frames_out, frames_in }
    }

    /// Start a pass: negotiate frame counts and prepare the accumulation
    /// buffer for `frames_in` frames.
    ///
    /// The only side effect is zeroing the negotiated region of the
    /// buffer; it is safe to `begin` and never mix anything (the pass
    /// then delivers silence). Calling `begin` again before `end` is a
    /// protocol violation.
    pub fn begin(&mut self, requested_out: u64) -> MixResult<Negotiation> {
        if self.state != BusState::Idle {
            return Err(MixError::Protocol("begin called while a pass is already in progress"));
        }
        let neg = self.negotiate(requested_out);
        self.accum.silence_frames(neg.frames_in as usize);
        self.state = BusState::Begun {
            frames_out: neg.frames_out,
            frames_in: neg.frames_in,
        };
        Ok(neg)
    }

    /// Pull up to `frame_count` frames from an externally owned source and
    /// add them into the prepared accumulation buffer, scaled by `volume`.
    ///
    /// Returns the frames actually produced. A short count is not an
    /// error - it signals exhaustion, and the remainder of the region
    /// stays silent for this source's contribution.
    pub fn mix_source(
        &mut self,
        source: &mut dyn Source,
        frame_count: u64,
        volume: f32,
    ) -> MixResult<u64> {
        let frames_in = match self.state {
            BusState::Begun { frames_in, .. } => frames_in,
            BusState::Idle => return Err(MixError::Protocol("mix_source called outside begin/end")),
        };
        if frame_count > frames_in {
            return Err(MixError::Protocol("mixing more frames than negotiated"));
        }
        if source.channels() as usize != self.channels {
            return Err(MixError::ChannelMismatch {
                bus: self.channels,
                input: source.channels() as usize,
            });
        }
        Ok(Self::pull_into(
            &mut self.accum,
            &mut self.scratch,
            source,
            frame_count as usize,
            volume,
        ))
    }

    /// Drive every attached input for the current pass: pull all enabled
    /// source slots, then run each child bus through its own begin/mix/end
    /// cycle, accumulating child output into this bus.
    ///
    /// A child with smaller capacity is looped with a write cursor until
    /// it has covered this bus's `frames_in` - the caller-side half of the
    /// back-pressure contract.
    pub fn mix_inputs(&mut self) -> MixResult<()> {
        let frames_in = match self.state {
            BusState::Begun { frames_in, .. } => frames_in,
            BusState::Idle => return Err(MixError::Protocol("mix_inputs called outside begin/end")),
        };

        for slot in &mut self.sources {
            if !slot.enabled {
                continue;
            }
            let produced = Self::pull_into(
                &mut self.accum,
                &mut self.scratch,
                slot.source.as_mut(),
                frames_in as usize,
                slot.volume,
            );
            if produced < frames_in && slot.source.exhausted() {
                // Normal terminal signal, not an error; stop pulling it.
                slot.enabled = false;
                log::debug!(
                    "bus {}: source exhausted after {produced} of {frames_in} frames, slot disabled",
                    self.id.0
                );
            }
        }

        for child in &mut self.children {
            let mut offset = 0u64;
            while offset < frames_in {
                child.begin(frames_in - offset)?;
                child.mix_inputs()?;
                let produced = child.end_into_parent_at(&mut self.accum, offset)?;
                if produced == 0 {
                    break;
                }
                offset += produced;
            }
        }

        Ok(())
    }

    fn pull_into(
        accum: &mut FrameBuffer,
        scratch: &mut FrameBuffer,
        source: &mut dyn Source,
        frames: usize,
        volume: f32,
    ) -> u64 {
        if frames == 0 {
            return 0;
        }
        let produced = source.pull(scratch.frames_mut(frames)).min(frames);
        accum.accumulate_at(0, scratch.frames(produced), volume);
        produced as u64
    }

    /// Apply the effect and volume, completing the pass
    fn finish(&mut self) -> MixResult<u64> {
        let (frames_out, frames_in) = match self.state {
            BusState::Begun { frames_out, frames_in } => (frames_out, frames_in),
            BusState::Idle => return Err(MixError::Protocol("end called without begin")),
        };

        let produced = match &mut self.effect {
            Some(fx) => {
                let buf = self.accum.frames_mut(frames_in as usize);
                let out = fx.process(buf, frames_in as usize, frames_out as usize) as u64;
                debug_assert!(out <= frames_out, "effect produced more frames than negotiated");
                out.min(frames_out)
            }
            // Without an effect the ratio is 1:1 and frames_in == frames_out.
            None => frames_out,
        };

        self.accum.scale_frames(produced as usize, self.volume);
        self.state = BusState::Idle;
        Ok(produced)
    }

    /// Finish the pass and add the result into a parent bus's accumulation
    /// buffer at the parent's write cursor. Returns frames delivered. An
    /// offset that would land frames past the parent's capacity is a
    /// protocol violation.
    pub fn end_into_parent_at(
        &mut self,
        parent_accum: &mut FrameBuffer,
        offset_frames: u64,
    ) -> MixResult<u64> {
        if parent_accum.channels() != self.channels {
            return Err(MixError::ChannelMismatch {
                bus: parent_accum.channels(),
                input: self.channels,
            });
        }
        let produced = self.finish()?;
        if offset_frames + produced > parent_accum.capacity_frames() as u64 {
            return Err(MixError::Protocol("end offset overruns the parent buffer"));
        }
        parent_accum.accumulate_at(offset_frames as usize, self.accum.frames(produced as usize), 1.0);
        Ok(produced)
    }

    /// Finish the pass and add the result into a parent bus's buffer at
    /// offset zero
    pub fn end_into_parent(&mut self, parent_accum: &mut FrameBuffer) -> MixResult<u64> {
        self.end_into_parent_at(parent_accum, 0)
    }

    /// Finish the pass and convert-write the result directly into a device
    /// buffer (root bus only). Returns frames delivered; only that many
    /// frames of `out` are written.
    pub fn end_into_device<T: OutputSample>(&mut self, out: &mut [T]) -> MixResult<u64> {
        let produced = self.finish()?;
        self.accum.write_to(out, produced as usize);
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;

    /// Emits a constant value on every channel; optionally finite
    struct ConstSource {
        channels: usize,
        value: Sample,
        remaining: Option<usize>,
    }

    impl ConstSource {
        fn infinite(channels: usize, value: Sample) -> Self {
            Self { channels, value, remaining: None }
        }

        fn finite(channels: usize, value: Sample, frames: usize) -> Self {
            Self { channels, value, remaining: Some(frames) }
        }
    }

    impl Source for ConstSource {
        fn pull(&mut self, out: &mut [Sample]) -> usize {
            let frames = out.len() / self.channels;
            let produced = match &mut self.remaining {
                Some(left) => {
                    let n = frames.min(*left);
                    *left -= n;
                    n
                }
                None => frames,
            };
            out[..produced * self.channels].fill(self.value);
            produced
        }

        fn channels(&self) -> u16 {
            self.channels as u16
        }

        fn exhausted(&self) -> bool {
            self.remaining == Some(0)
        }
    }

    /// Keeps every second frame: consumes 2 input frames per output frame
    struct Halver {
        channels: usize,
    }

    impl Effect for Halver {
        fn process(&mut self, buffer: &mut [Sample], frames_in: usize, frames_out: usize) -> usize {
            let produced = (frames_in / 2).min(frames_out);
            for frame in 0..produced {
                for ch in 0..self.channels {
                    buffer[frame * self.channels + ch] = buffer[frame * 2 * self.channels + ch];
                }
            }
            produced
        }

        fn input_output_ratio(&self) -> f64 {
            2.0
        }

        fn channels(&self) -> u16 {
            self.channels as u16
        }

        fn reset(&mut self) {}
    }

    fn stereo_bus(capacity: usize) -> MixBus {
        MixBus::new(2, 48000, capacity).unwrap()
    }

    #[test]
    fn test_begin_clamps_to_capacity() {
        let mut bus = stereo_bus(4096);
        let neg = bus.begin(10000).unwrap();
        assert_eq!(neg.frames_out, 4096);
        assert_eq!(neg.frames_in, 4096);
    }

    #[test]
    fn test_identity_ratio_counts_match() {
        let mut bus = stereo_bus(4096);
        for request in [0u64, 1, 17, 4095, 4096] {
            let neg = bus.begin(request).unwrap();
            assert_eq!(neg.frames_in, neg.frames_out);
            assert_eq!(neg.frames_out, request);
            let mut sink = FrameBuffer::new(4096, 2);
            bus.end_into_parent(&mut sink).unwrap();
        }
    }

    #[test]
    fn test_effect_ratio_negotiation() {
        let mut bus = stereo_bus(4096);
        bus.set_effect(Box::new(Halver { channels: 2 })).unwrap();

        let neg = bus.begin(100).unwrap();
        assert_eq!(neg.frames_out, 100);
        assert_eq!(neg.frames_in, 200);
        let mut sink = FrameBuffer::new(4096, 2);
        bus.end_into_parent(&mut sink).unwrap();

        // Demand that would overflow capacity is clamped down, not dropped
        let neg = bus.begin(4096).unwrap();
        assert_eq!(neg.frames_in, 4096);
        assert_eq!(neg.frames_out, 2048);
    }

    #[test]
    fn test_capacity_too_small_for_ratio() {
        let mut bus = stereo_bus(1);
        let err = bus.set_effect(Box::new(Halver { channels: 2 })).unwrap_err();
        assert!(matches!(err, MixError::CapacityTooSmallForEffect { .. }));
    }

    #[test]
    fn test_repeated_begin_partitions_request() {
        let mut bus = stereo_bus(4096);
        let mut sink = FrameBuffer::new(4096, 2);

        let mut remaining = 10000u64;
        let mut chunks = Vec::new();
        while remaining > 0 {
            let neg = bus.begin(remaining).unwrap();
            bus.end_into_parent(&mut sink).unwrap();
            chunks.push(neg.frames_out);
            remaining -= neg.frames_out;
        }

        assert_eq!(chunks, vec![4096, 4096, 1808]);
        assert_eq!(chunks.iter().sum::<u64>(), 10000);
    }

    #[test]
    fn test_protocol_violations_fail_fast() {
        let mut bus = stereo_bus(64);
        let mut source = ConstSource::infinite(2, 1.0);
        let mut sink = FrameBuffer::new(64, 2);

        // mix before begin
        assert!(matches!(
            bus.mix_source(&mut source, 16, 1.0),
            Err(MixError::Protocol(_))
        ));
        // end without begin
        assert!(matches!(bus.end_into_parent(&mut sink), Err(MixError::Protocol(_))));

        bus.begin(16).unwrap();
        // double begin
        assert!(matches!(bus.begin(16), Err(MixError::Protocol(_))));
        // mixing more frames than negotiated
        assert!(matches!(
            bus.mix_source(&mut source, 17, 1.0),
            Err(MixError::Protocol(_))
        ));
        // a valid end recovers the state machine
        bus.end_into_parent(&mut sink).unwrap();
        bus.begin(16).unwrap();
        bus.end_into_parent(&mut sink).unwrap();
    }

    #[test]
    fn test_end_offset_overrunning_parent_rejected() {
        let mut bus = stereo_bus(64);
        let mut source = ConstSource::infinite(2, 1.0);
        bus.begin(8).unwrap();
        bus.mix_source(&mut source, 8, 1.0).unwrap();

        // 4 + 8 frames would land past an 8-frame parent
        let mut parent = FrameBuffer::new(8, 2);
        assert!(matches!(
            bus.end_into_parent_at(&mut parent, 4),
            Err(MixError::Protocol(_))
        ));
    }

    #[test]
    fn test_volume_applied_once_at_end() {
        let mut bus = stereo_bus(64);
        bus.set_volume(0.5);
        let mut a = ConstSource::infinite(2, 1.0);
        let mut b = ConstSource::infinite(2, 1.0);

        bus.begin(4).unwrap();
        bus.mix_source(&mut a, 4, 1.0).unwrap();
        bus.mix_source(&mut b, 4, 1.0).unwrap();
        let mut sink = FrameBuffer::new(64, 2);
        bus.end_into_parent(&mut sink).unwrap();

        // (1.0 + 1.0) * 0.5; scaling twice would give 0.5 instead
        assert_eq!(sink.frames(4), &[1.0; 8]);
    }

    #[test]
    fn test_source_exhaustion_leaves_silence() {
        let mut bus = stereo_bus(64);
        let id = bus
            .add_source(Box::new(ConstSource::finite(2, 1.0, 10)), 1.0)
            .unwrap();

        bus.begin(16).unwrap();
        bus.mix_inputs().unwrap();
        let mut sink = FrameBuffer::new(64, 2);
        bus.end_into_parent(&mut sink).unwrap();

        assert_eq!(&sink.frames(16)[..20], &[1.0; 20]);
        assert_eq!(&sink.frames(16)[20..], &[0.0; 12]);
        // The exhausted slot was disabled for subsequent passes
        assert!(!bus.source_enabled(id).unwrap());
    }

    #[test]
    fn test_accumulation_buffer_overwritten_between_passes() {
        let mut bus = stereo_bus(64);
        let mut source = ConstSource::finite(2, 1.0, 8);
        let mut sink = FrameBuffer::new(64, 2);

        bus.begin(8).unwrap();
        bus.mix_source(&mut source, 8, 1.0).unwrap();
        bus.end_into_parent(&mut sink).unwrap();

        // Second pass mixes nothing; no stale samples may leak through
        let mut sink2 = FrameBuffer::new(64, 2);
        bus.begin(8).unwrap();
        bus.end_into_parent(&mut sink2).unwrap();
        assert_eq!(sink2.peak(8), 0.0);
    }

    #[test]
    fn test_muted_submix_does_not_affect_sibling() {
        let mut parent = stereo_bus(64);

        let mut muted = stereo_bus(64);
        muted.set_volume(0.0);
        muted
            .add_source(Box::new(ConstSource::infinite(2, 1.0)), 1.0)
            .unwrap();
        parent.add_child(muted).unwrap();

        let mut audible = stereo_bus(64);
        audible
            .add_source(Box::new(ConstSource::infinite(2, 0.25)), 1.0)
            .unwrap();
        parent.add_child(audible).unwrap();

        parent.begin(8).unwrap();
        parent.mix_inputs().unwrap();
        let mut sink = FrameBuffer::new(64, 2);
        parent.end_into_parent(&mut sink).unwrap();

        assert_eq!(sink.frames(8), &[0.25; 16]);
    }

    #[test]
    fn test_child_with_smaller_capacity_is_looped() {
        let mut parent = stereo_bus(64);
        let mut child = stereo_bus(16);
        child
            .add_source(Box::new(ConstSource::infinite(2, 1.0)), 1.0)
            .unwrap();
        parent.add_child(child).unwrap();

        parent.begin(64).unwrap();
        parent.mix_inputs().unwrap();
        let mut sink = FrameBuffer::new(64, 2);
        parent.end_into_parent(&mut sink).unwrap();

        // Four child passes of 16 frames fully cover the parent's request
        assert_eq!(sink.frames(64), &[1.0; 128]);
    }

    #[test]
    fn test_end_into_device_converts_format() {
        let mut bus = stereo_bus(64);
        let mut source = ConstSource::infinite(2, 1.0);

        bus.begin(4).unwrap();
        bus.mix_source(&mut source, 4, 1.0).unwrap();
        let mut out = [0u8; 8];
        let produced = bus.end_into_device(&mut out).unwrap();

        assert_eq!(produced, 4);
        assert_eq!(out, [255; 8]);
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let mut bus = stereo_bus(64);
        let err = bus
            .add_source(Box::new(ConstSource::infinite(1, 1.0)), 1.0)
            .unwrap_err();
        assert!(matches!(err, MixError::ChannelMismatch { bus: 2, input: 1 }));
    }
}
