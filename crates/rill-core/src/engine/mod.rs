//! The mixing engine: buses, the graph that owns them, and the command
//! channel that controls a graph after it has moved into the audio
//! callback.

mod bus;
mod command;
mod error;
mod graph;

pub use bus::{BusId, MixBus, Negotiation, SourceId, DEFAULT_BUS_CAPACITY};
pub use command::{command_channel, GraphCommand, COMMAND_QUEUE_CAPACITY};
pub use error::{MixError, MixResult};
pub use graph::{GraphConfig, MixGraph};
