//! Notifications published by running sessions for host applications.

use crate::session::{SessionId, SessionState};
use serde::Serialize;
use tokio::sync::broadcast;

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    Stopped,
    TurnLimitReached,
    TransportLost,
    TimedOut,
    TooManyFailures(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StateChanged {
        session_id: SessionId,
        state: SessionState,
    },
    TranscriptReceived {
        session_id: SessionId,
        text: String,
    },
    /// Text the agent is about to speak. `fallback` marks the configured fallback message.
    ResponseReady {
        session_id: SessionId,
        text: String,
        fallback: bool,
    },
    TurnFailed {
        session_id: SessionId,
        error: String,
    },
    ConfigApplied {
        session_id: SessionId,
        revision: u32,
    },
    Ended {
        session_id: SessionId,
        reason: EndReason,
    },
}

impl AgentEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            AgentEvent::StateChanged { session_id, .. }
            | AgentEvent::TranscriptReceived { session_id, .. }
            | AgentEvent::ResponseReady { session_id, .. }
            | AgentEvent::TurnFailed { session_id, .. }
            | AgentEvent::ConfigApplied { session_id, .. }
            | AgentEvent::Ended { session_id, .. } => session_id,
        }
    }

    /// Short name used as the SSE event type.
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::StateChanged { .. } => "state_changed",
            AgentEvent::TranscriptReceived { .. } => "transcript_received",
            AgentEvent::ResponseReady { .. } => "response_ready",
            AgentEvent::TurnFailed { .. } => "turn_failed",
            AgentEvent::ConfigApplied { .. } => "config_applied",
            AgentEvent::Ended { .. } => "ended",
        }
    }
}

/// Fan-out of agent events to any number of subscribers.
///
/// Slow subscribers that fall more than `capacity` events behind lose the
/// oldest events and observe a lag error from the receiver.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AgentEvent::Ended {
            session_id: SessionId::new("dock", "pilot"),
            reason: EndReason::TooManyFailures("Service timed out".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ended");
        assert_eq!(json["session_id"]["channel"], "dock");
        assert_eq!(json["reason"]["kind"], "too_many_failures");
        assert_eq!(event.name(), "ended");
    }

    #[tokio::test]
    async fn test_bus_delivers_to_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let event = AgentEvent::StateChanged {
            session_id: SessionId::new("dock", "pilot"),
            state: SessionState::Listening,
        };
        bus.publish(event.clone());
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }
}
