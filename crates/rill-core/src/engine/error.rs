//! Mixing engine error types

use thiserror::Error;

/// Errors from graph construction and the begin/mix/end protocol
#[derive(Error, Debug)]
pub enum MixError {
    /// Bus capacity of zero frames can never make progress
    #[error("bus capacity must be at least 1 frame")]
    InvalidCapacity,

    /// Channel count of zero
    #[error("channel count must be at least 1")]
    InvalidChannelCount,

    /// A graph must be built with the real device rate, never a
    /// placeholder zero (the device rate is only known after the device
    /// has been opened).
    #[error("sample rate must be known and non-zero before the graph is built")]
    InvalidSampleRate,

    /// An effect's frame ratio would leave no room for even a single
    /// output frame per pass
    #[error("bus capacity of {capacity} frames cannot satisfy an effect ratio of {ratio}")]
    CapacityTooSmallForEffect { capacity: u64, ratio: f64 },

    /// Effect declared a nonsensical frame ratio
    #[error("effect ratio must be finite and positive (got {0})")]
    InvalidEffectRatio(f64),

    /// Invalid effect parameters at construction
    #[error("invalid effect configuration: {0}")]
    InvalidEffectConfig(&'static str),

    /// Channel count disagreement between a bus and an attached input
    #[error("channel count mismatch: bus has {bus}, input has {input}")]
    ChannelMismatch { bus: usize, input: usize },

    /// Bus id does not exist in this graph
    #[error("unknown bus id {0}")]
    UnknownBus(u32),

    /// Source id does not exist on the addressed bus
    #[error("unknown source id {0}")]
    UnknownSource(usize),

    /// begin/mix/end called out of sequence, or mixing more frames than
    /// negotiated. A programming error - failing fast here is what keeps
    /// the accumulation buffer from being corrupted.
    #[error("mix protocol violation: {0}")]
    Protocol(&'static str),
}

/// Result type for mixing operations
pub type MixResult<T> = Result<T, MixError>;
