//! Session identity and the status snapshots published for each agent session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies an agent session: one agent occupying one slot in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId {
    pub channel: String,
    pub agent_id: String,
}

impl SessionId {
    pub fn new(channel: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            agent_id: agent_id.into(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.agent_id)
    }
}

/// Lifecycle state of a session's turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Responding,
    Ended,
}

impl SessionState {
    /// True while a turn is being worked on.
    pub fn is_in_flight(self) -> bool {
        matches!(self, SessionState::Processing | SessionState::Responding)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Responding => "responding",
            SessionState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Point-in-time status of a session, readable without waiting on the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub turn_count: u32,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Bumped every time a queued configuration update is applied.
    pub config_revision: u32,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            turn_count: 0,
            last_error: None,
            consecutive_failures: 0,
            config_revision: 0,
        }
    }
}

/// Returned by a successful create; identifies this incarnation of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub id: SessionId,
    pub instance: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One row of `list_agents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub instance: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}
