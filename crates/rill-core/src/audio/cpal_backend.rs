//! cpal output backend
//!
//! The stream callback takes ownership of the mix graph and its command
//! consumer; each invocation drains pending commands and renders directly
//! into the hardware buffer. Nothing in the callback allocates or locks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::engine::{GraphCommand, MixGraph};
use crate::types::{OutputSample, SampleFormat, DEFAULT_SAMPLE_RATE};

use super::config::{BufferSize, DeviceConfig};
use super::error::{AudioError, AudioResult};

fn to_cpal_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::U8 => cpal::SampleFormat::U8,
        SampleFormat::I16 => cpal::SampleFormat::I16,
        SampleFormat::I32 => cpal::SampleFormat::I32,
        SampleFormat::F32 => cpal::SampleFormat::F32,
    }
}

/// An opened but not yet started output device.
///
/// Exists so the caller can read the negotiated sample rate back and
/// build a mix graph at that rate before the stream starts.
pub struct OutputDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

impl OutputDevice {
    /// Pick a device and negotiate a stream configuration.
    ///
    /// The channel count is a hard requirement; sample format and rate
    /// fall back to what the device offers, with a warning.
    pub fn open(config: &DeviceConfig) -> AudioResult<Self> {
        let host = cpal::default_host();

        let device = match &config.device {
            Some(name) => host
                .output_devices()
                .map_err(|e| AudioError::ConfigError(e.to_string()))?
                .find(|d| d.name().map(|n| n.contains(name.as_str())).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(name.clone()))?,
            None => host.default_output_device().ok_or(AudioError::NoDevices)?,
        };
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());

        let candidates: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .filter(|c| c.channels() == config.channels)
            .collect();
        if candidates.is_empty() {
            return Err(AudioError::ConfigError(format!(
                "device '{device_name}' does not support {} output channels",
                config.channels
            )));
        }

        let wanted = to_cpal_format(config.sample_format);
        let range = candidates
            .iter()
            .find(|c| c.sample_format() == wanted)
            .or_else(|| {
                log::warn!(
                    "device '{device_name}' does not support {:?}, falling back",
                    config.sample_format
                );
                candidates
                    .iter()
                    .find(|c| c.sample_format() == cpal::SampleFormat::F32)
            })
            .unwrap_or(&candidates[0]);

        let desired_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let rate = desired_rate
            .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
        if rate != desired_rate {
            log::warn!("device '{device_name}' cannot run at {desired_rate} Hz, using {rate} Hz");
        }

        let supported = range.clone().with_sample_rate(cpal::SampleRate(rate));
        let sample_format = supported.sample_format();
        let mut stream_config: cpal::StreamConfig = supported.into();
        if let BufferSize::Fixed(frames) = config.buffer_size {
            stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
        }

        log::info!(
            "opened '{device_name}': {} ch, {rate} Hz, {sample_format:?}",
            stream_config.channels
        );

        Ok(Self {
            device,
            config: stream_config,
            sample_format,
        })
    }

    /// Negotiated sample rate; build the mix graph with this
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Negotiated channel count
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Negotiated sample encoding
    pub fn sample_format(&self) -> SampleFormat {
        match self.sample_format {
            cpal::SampleFormat::U8 => SampleFormat::U8,
            cpal::SampleFormat::I16 => SampleFormat::I16,
            cpal::SampleFormat::I32 => SampleFormat::I32,
            _ => SampleFormat::F32,
        }
    }

    /// Start playback, moving the graph and command consumer into the
    /// stream callback.
    pub fn start(
        self,
        graph: MixGraph,
        command_rx: rtrb::Consumer<GraphCommand>,
    ) -> AudioResult<PlaybackHandle> {
        if graph.channels() != self.config.channels as usize {
            return Err(AudioError::ConfigError(format!(
                "graph has {} channels but the device stream has {}",
                graph.channels(),
                self.config.channels
            )));
        }
        if graph.sample_rate() != self.config.sample_rate.0 {
            return Err(AudioError::ConfigError(format!(
                "graph rate {} Hz does not match the device stream rate {} Hz",
                graph.sample_rate(),
                self.config.sample_rate.0
            )));
        }

        match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(graph, command_rx),
            cpal::SampleFormat::I16 => self.build_stream::<i16>(graph, command_rx),
            cpal::SampleFormat::I32 => self.build_stream::<i32>(graph, command_rx),
            cpal::SampleFormat::U8 => self.build_stream::<u8>(graph, command_rx),
            other => Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
        }
    }

    fn build_stream<T: OutputSample + cpal::SizedSample>(
        self,
        mut graph: MixGraph,
        mut command_rx: rtrb::Consumer<GraphCommand>,
    ) -> AudioResult<PlaybackHandle> {
        let sample_rate = self.config.sample_rate.0;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    graph.process_commands(&mut command_rx);
                    if let Err(e) = graph.render(data) {
                        log::error!("render failed, emitting silence: {e}");
                        data.fill(<T as OutputSample>::from_sample(0.0));
                    }
                },
                |e| log::error!("audio stream error: {e}"),
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        Ok(PlaybackHandle {
            _stream: stream,
            sample_rate,
        })
    }
}

/// A running output stream. Playback stops when this is dropped.
pub struct PlaybackHandle {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl PlaybackHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
