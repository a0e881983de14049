//! Parley API Library Crate
//!
//! This library contains the HTTP control plane for the agent controller:
//! configuration, application state, REST and SSE handlers, the participant
//! WebSocket, and routing. The `api` binary is a thin wrapper around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;

#[cfg(test)]
mod test_support;
