//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the agent controller
//! and the local channel hub shared by every handler.

use parley_core::{AgentConfig, AgentController, LocalTransport};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AgentController>,
    pub hub: LocalTransport,
    /// Defaults that per-agent configuration is layered over on create.
    pub agent_defaults: Arc<AgentConfig>,
}
