//! Control-to-callback command channel
//!
//! The audio callback owns the mix graph outright; there is no shared
//! state and no lock. Control threads adjust the running graph by pushing
//! commands into a lock-free SPSC ring buffer, which the callback drains
//! at the top of every invocation. Pushing and popping are wait-free, so
//! neither side can stall the other.

use super::bus::{BusId, SourceId};

/// Number of commands the ring buffer can hold. Commands are drained
/// every callback, so this only needs to absorb one callback period's
/// worth of control activity.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Parameter changes applied to a live graph between passes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GraphCommand {
    /// Set the root bus volume
    SetMasterVolume(f32),
    /// Set a bus's end-of-mix volume
    SetBusVolume { bus: BusId, volume: f32 },
    /// Set the mix volume of a source slot
    SetSourceVolume {
        bus: BusId,
        source: SourceId,
        volume: f32,
    },
    /// Enable or disable a source slot
    SetSourceEnabled {
        bus: BusId,
        source: SourceId,
        enabled: bool,
    },
}

/// Create the command channel connecting a control thread to the audio
/// callback. The producer side stays with the controller; the consumer
/// side moves into the callback along with the graph.
pub fn command_channel() -> (rtrb::Producer<GraphCommand>, rtrb::Consumer<GraphCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();
        tx.push(GraphCommand::SetMasterVolume(0.5)).unwrap();
        assert_eq!(rx.pop(), Ok(GraphCommand::SetMasterVolume(0.5)));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_channel_is_bounded() {
        let (mut tx, _rx) = command_channel();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            tx.push(GraphCommand::SetMasterVolume(1.0)).unwrap();
        }
        // A full queue rejects instead of blocking
        assert!(tx.push(GraphCommand::SetMasterVolume(1.0)).is_err());
    }
}
