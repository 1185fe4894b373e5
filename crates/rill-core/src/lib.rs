//! Rill - a hierarchical pull-based real-time audio mixing engine
//!
//! Sources feed buses, buses feed parent buses, and the root bus writes
//! converted frames straight into the device buffer. Every pass through a
//! bus follows the begin/mix/end protocol, with all frame-count
//! negotiation (capacity clamping, effect frame ratios) settled in
//! `begin`. The whole graph is owned by the audio callback; control
//! threads steer it through a lock-free command channel.
//!
//! Typical setup:
//!
//! ```no_run
//! use rill_core::audio::{DeviceConfig, OutputDevice};
//! use rill_core::engine::{command_channel, GraphConfig, MixGraph};
//! use rill_core::source::{WaveformConfig, WaveformSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = OutputDevice::open(&DeviceConfig::stereo_default())?;
//! let mut graph = MixGraph::new(GraphConfig {
//!     channels: device.channels(),
//!     sample_rate: device.sample_rate(),
//!     ..GraphConfig::default()
//! })?;
//! let tone = WaveformSource::new(WaveformConfig {
//!     sample_rate: device.sample_rate(),
//!     ..WaveformConfig::default()
//! })?;
//! graph.add_source(MixGraph::ROOT, Box::new(tone), 1.0)?;
//!
//! let (_tx, rx) = command_channel();
//! let _playback = device.start(graph, rx)?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod effect;
pub mod engine;
pub mod source;
pub mod types;

pub use types::*;
