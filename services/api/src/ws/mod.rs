//! Participant WebSocket
//!
//! Lets a human join a channel of the local hub over a WebSocket:
//!
//! - `protocol`: the JSON control messages exchanged alongside binary audio.
//! - `session`: the connection lifecycle, bridging the socket and the hub.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
