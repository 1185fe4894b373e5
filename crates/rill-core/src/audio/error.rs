//! Playback device error types

use thiserror::Error;

/// Errors from device discovery and stream setup
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio output devices available")]
    NoDevices,

    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("audio configuration error: {0}")]
    ConfigError(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("failed to start audio stream: {0}")]
    StreamPlayError(String),
}

/// Result type for playback device operations
pub type AudioResult<T> = Result<T, AudioError>;
