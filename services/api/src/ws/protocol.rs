//! Defines the WebSocket message protocol between a participant client and the API server.
//!
//! Audio travels as binary frames of little-endian PCM16 at the negotiated
//! sample rate. Text frames carry the JSON messages below.

use parley_core::AgentEvent;
use serde::{Deserialize, Serialize};

/// Messages sent from the client to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Base64-encoded PCM16 audio, for clients that cannot send binary frames.
    Audio { data: String },
    /// Leaves the channel and closes the connection.
    Leave,
}

/// Messages sent from the server to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms that the participant is in the channel.
    Joined {
        channel: String,
        participant: String,
        sample_rate: u32,
    },
    /// Reports an error. Fatal errors are followed by a close frame.
    Error { message: String },
    /// An event from one of the agents in the channel.
    Event { event: AgentEvent },
}
