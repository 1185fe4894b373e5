//! MixGraph - an owned tree of buses and the render loop over it
//!
//! The graph wraps the bus tree behind stable ids so control code can
//! address buses and sources without holding references into the tree.
//! `render` drives the whole tree through as many begin/mix/end passes
//! as it takes to fill an arbitrarily sized output buffer.

use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::source::Source;
use crate::types::{OutputSample, DEFAULT_SAMPLE_RATE};

use super::bus::{BusId, MixBus, SourceId, DEFAULT_BUS_CAPACITY};
use super::command::GraphCommand;
use super::error::{MixError, MixResult};

/// Format and capacity shared by every bus in a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Interleaved channel count
    pub channels: u16,
    /// Mix rate; must be the real device rate, read back after the
    /// device was opened
    pub sample_rate: u32,
    /// Frames per negotiation pass
    pub capacity_frames: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: DEFAULT_SAMPLE_RATE,
            capacity_frames: DEFAULT_BUS_CAPACITY,
        }
    }
}

/// An owned mixing tree. Built and wired on a control thread, then moved
/// wholesale into the audio callback; after the move, all adjustment goes
/// through [`GraphCommand`]s.
pub struct MixGraph {
    root: MixBus,
    next_bus_id: u32,
}

impl MixGraph {
    /// Id of the root bus, valid for every graph
    pub const ROOT: BusId = BusId(0);

    /// Create a graph containing only the root bus
    pub fn new(config: GraphConfig) -> MixResult<Self> {
        let root = MixBus::new(config.channels, config.sample_rate, config.capacity_frames)?;
        Ok(Self { root, next_bus_id: 1 })
    }

    /// Interleaved channel count of every bus in the graph
    pub fn channels(&self) -> usize {
        self.root.channels()
    }

    /// Mix sample rate
    pub fn sample_rate(&self) -> u32 {
        self.root.sample_rate()
    }

    /// Frames per negotiation pass
    pub fn capacity_frames(&self) -> usize {
        self.root.capacity_frames()
    }

    /// Add a child bus under `parent`, inheriting the graph's format and
    /// capacity. Returns the new bus's id.
    pub fn add_bus(&mut self, parent: BusId, volume: f32) -> MixResult<BusId> {
        let id = BusId(self.next_bus_id);
        let mut bus = MixBus::new(
            self.root.channels() as u16,
            self.root.sample_rate(),
            self.root.capacity_frames(),
        )?;
        bus.id = id;
        bus.set_volume(volume);

        let parent = self.bus_mut(parent)?;
        parent.add_child(bus)?;
        self.next_bus_id += 1;
        Ok(id)
    }

    fn bus_mut(&mut self, id: BusId) -> MixResult<&mut MixBus> {
        self.root.find_mut(id).ok_or(MixError::UnknownBus(id.0))
    }

    /// Attach an effect to a bus
    pub fn set_effect(&mut self, bus: BusId, effect: Box<dyn Effect>) -> MixResult<()> {
        self.bus_mut(bus)?.set_effect(effect)
    }

    /// Attach a source to a bus, returning its slot id
    pub fn add_source(
        &mut self,
        bus: BusId,
        source: Box<dyn Source>,
        volume: f32,
    ) -> MixResult<SourceId> {
        self.bus_mut(bus)?.add_source(source, volume)
    }

    /// Set a bus's end-of-mix volume
    pub fn set_bus_volume(&mut self, bus: BusId, volume: f32) -> MixResult<()> {
        self.bus_mut(bus)?.set_volume(volume);
        Ok(())
    }

    /// Set the mix volume of a source slot
    pub fn set_source_volume(&mut self, bus: BusId, source: SourceId, volume: f32) -> MixResult<()> {
        self.bus_mut(bus)?.set_source_volume(source, volume)
    }

    /// Enable or disable a source slot
    pub fn set_source_enabled(&mut self, bus: BusId, source: SourceId, enabled: bool) -> MixResult<()> {
        self.bus_mut(bus)?.set_source_enabled(source, enabled)
    }

    /// Whether a source slot is currently enabled
    pub fn source_enabled(&mut self, bus: BusId, source: SourceId) -> MixResult<bool> {
        self.bus_mut(bus)?.source_enabled(source)
    }

    /// Set the root bus volume
    pub fn set_master_volume(&mut self, volume: f32) {
        self.root.set_volume(volume);
    }

    /// Get the root bus volume
    pub fn master_volume(&self) -> f32 {
        self.root.volume()
    }

    /// Drain and apply pending commands. Called from the audio callback
    /// before rendering; never blocks. A command addressing a bus or
    /// source that does not exist is logged and dropped.
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<GraphCommand>) {
        while let Ok(cmd) = rx.pop() {
            let result = match cmd {
                GraphCommand::SetMasterVolume(v) => {
                    self.set_master_volume(v);
                    Ok(())
                }
                GraphCommand::SetBusVolume { bus, volume } => self.set_bus_volume(bus, volume),
                GraphCommand::SetSourceVolume { bus, source, volume } => {
                    self.set_source_volume(bus, source, volume)
                }
                GraphCommand::SetSourceEnabled { bus, source, enabled } => {
                    self.set_source_enabled(bus, source, enabled)
                }
            };
            if let Err(e) = result {
                log::warn!("dropping graph command {cmd:?}: {e}");
            }
        }
    }

    /// Fill `out` completely by running the tree through repeated
    /// begin/mix/end passes, each bounded by bus capacity.
    ///
    /// `out.len()` must be a whole number of frames. Exhausted sources
    /// fall out along the way; the graph itself always delivers every
    /// requested frame (silence once nothing is playing).
    pub fn render<T: OutputSample>(&mut self, out: &mut [T]) -> MixResult<()> {
        let channels = self.root.channels();
        if out.len() % channels != 0 {
            return Err(MixError::Protocol("output buffer is not a whole number of frames"));
        }
        let total_frames = (out.len() / channels) as u64;

        let mut offset = 0u64;
        while offset < total_frames {
            self.root.begin(total_frames - offset)?;
            self.root.mix_inputs()?;
            let produced = self
                .root
                .end_into_device(&mut out[offset as usize * channels..])?;
            if produced == 0 {
                // Capacity and ratio were validated at construction, so a
                // zero-frame pass means the state machine is broken.
                return Err(MixError::Protocol("render pass produced zero frames"));
            }
            offset += produced;
        }
        Ok(())
    }
}
