//! Playback device handling
//!
//! Opening a device is a two-phase affair: `OutputDevice::open` picks a
//! device and negotiates a stream configuration, after which the caller
//! reads the actual sample rate back and builds the mix graph with it.
//! `OutputDevice::start` then moves the graph into the stream callback.

mod config;
mod cpal_backend;
mod error;

pub use config::{BufferSize, DeviceConfig, MAX_BUFFER_SIZE};
pub use cpal_backend::{OutputDevice, PlaybackHandle};
pub use error::{AudioError, AudioResult};
