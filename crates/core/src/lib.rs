pub mod audio;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod events;
pub mod media;
mod pipeline;
pub mod registry;
pub mod services;
pub mod session;
pub mod transport;
pub mod vad;

#[cfg(test)]
mod test_support;

pub use config::{AgentConfig, AgentConfigPatch, CreateAgentRequest, TimeoutAction};
pub use context::Turn;
pub use controller::{AgentController, ControllerSettings};
pub use error::{AgentError, ServiceError};
pub use events::{AgentEvent, EndReason, EventBus};
pub use services::Services;
pub use session::{SessionHandle, SessionId, SessionState, SessionStatus, SessionSummary};
pub use transport::{LocalTransport, ParticipantRole, Transport, TransportLink};
