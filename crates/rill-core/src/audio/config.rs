//! Playback device configuration

use serde::{Deserialize, Serialize};

use crate::types::SampleFormat;

/// Upper bound on requested hardware buffer size, in frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Hardware buffer size request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the backend pick
    #[default]
    Default,
    /// Request a specific frame count (the backend may still adjust it)
    Fixed(u32),
}

/// How to pick and open an output device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name substring; `None` uses the system default output
    pub device: Option<String>,
    /// Preferred sample encoding; falls back with a warning if the device
    /// cannot do it
    pub sample_format: SampleFormat,
    /// Required channel count; opening fails if the device cannot match
    pub channels: u16,
    /// Preferred sample rate; `None` asks for the engine default, clamped
    /// to what the device supports. Always read the rate back after open.
    pub sample_rate: Option<u32>,
    /// Hardware buffer size request
    pub buffer_size: BufferSize,
}

impl DeviceConfig {
    /// Stereo on the default device, f32, default rate and buffering
    pub fn stereo_default() -> Self {
        Self {
            channels: 2,
            ..Self::default()
        }
    }

    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_buffer_size(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames.min(MAX_BUFFER_SIZE as u32));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps_buffer_size() {
        let config = DeviceConfig::stereo_default().with_buffer_size(1 << 20);
        assert_eq!(config.buffer_size, BufferSize::Fixed(MAX_BUFFER_SIZE as u32));
    }

    #[test]
    fn test_default_has_no_device_preference() {
        let config = DeviceConfig::stereo_default();
        assert!(config.device.is_none());
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_format, SampleFormat::F32);
    }
}
