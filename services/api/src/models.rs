//! API Models
//!
//! Request and response bodies of the control-plane API. They mirror the core
//! types and carry the `utoipa` schemas used to generate the OpenAPI document.

use chrono::{DateTime, Utc};
use parley_core::{
    AgentConfigPatch, SessionHandle, SessionState, SessionStatus, SessionSummary, TimeoutAction,
    Turn,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Listening,
    Processing,
    Responding,
    Ended,
}

impl From<SessionState> for AgentState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Idle => AgentState::Idle,
            SessionState::Listening => AgentState::Listening,
            SessionState::Processing => AgentState::Processing,
            SessionState::Responding => AgentState::Responding,
            SessionState::Ended => AgentState::Ended,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    /// Speak the fallback and keep listening.
    Resume,
    /// Speak the fallback and end the session.
    EndSession,
}

impl From<OnTimeout> for TimeoutAction {
    fn from(action: OnTimeout) -> Self {
        match action {
            OnTimeout::Resume => TimeoutAction::Resume,
            OnTimeout::EndSession => TimeoutAction::EndSession,
        }
    }
}

/// Persona configuration. Omitted fields keep the server default on create,
/// or the current value on update.
#[derive(Debug, Default, Deserialize, ToSchema, Clone)]
#[serde(default)]
pub struct AgentConfigPayload {
    #[schema(example = "You are a cheerful fruit vendor in a busy market.")]
    pub persona_prompt: Option<String>,
    #[schema(example = "Fresh apples, get your fresh apples!")]
    pub greeting: Option<String>,
    pub fallback_text: Option<String>,
    #[schema(example = 10)]
    pub history_depth: Option<usize>,
    /// End the session after this many turns. `0` removes the limit.
    pub max_turns: Option<u32>,
    #[schema(example = 10000)]
    pub response_timeout_ms: Option<u64>,
    pub on_timeout: Option<OnTimeout>,
    pub max_consecutive_failures: Option<u32>,
}

impl AgentConfigPayload {
    pub fn into_patch(self, reset_history: bool) -> AgentConfigPatch {
        AgentConfigPatch {
            persona_prompt: self.persona_prompt,
            greeting: self.greeting,
            fallback_text: self.fallback_text,
            history_depth: self.history_depth,
            max_turns: self.max_turns,
            response_timeout_ms: self.response_timeout_ms,
            on_timeout: self.on_timeout.map(Into::into),
            max_consecutive_failures: self.max_consecutive_failures,
            reset_history,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAgentPayload {
    #[schema(example = "market-square")]
    pub channel: String,
    #[schema(example = "fruit-vendor")]
    pub agent_id: String,
    #[serde(default)]
    pub config: AgentConfigPayload,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAgentPayload {
    #[serde(flatten)]
    pub config: AgentConfigPayload,
    /// Clear the conversation history when the update is applied.
    #[serde(default)]
    pub reset_history: bool,
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct AgentHandle {
    pub channel: String,
    pub agent_id: String,
    #[schema(value_type = String, format = Uuid)]
    pub instance: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<SessionHandle> for AgentHandle {
    fn from(handle: SessionHandle) -> Self {
        Self {
            channel: handle.id.channel,
            agent_id: handle.id.agent_id,
            instance: handle.instance,
            created_at: handle.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct AgentStatus {
    pub state: AgentState,
    pub turn_count: u32,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Number of configuration updates applied so far.
    pub config_revision: u32,
}

impl From<SessionStatus> for AgentStatus {
    fn from(status: SessionStatus) -> Self {
        Self {
            state: status.state.into(),
            turn_count: status.turn_count,
            last_error: status.last_error,
            consecutive_failures: status.consecutive_failures,
            config_revision: status.config_revision,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct AgentSummary {
    #[serde(flatten)]
    pub handle: AgentHandle,
    pub status: AgentStatus,
}

impl From<SessionSummary> for AgentSummary {
    fn from(summary: SessionSummary) -> Self {
        Self {
            handle: AgentHandle {
                channel: summary.id.channel,
                agent_id: summary.id.agent_id,
                instance: summary.instance,
                created_at: summary.created_at,
            },
            status: summary.status.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct TurnRecord {
    pub transcript: String,
    pub response: String,
}

impl From<Turn> for TurnRecord {
    fn from(turn: Turn) -> Self {
        Self {
            transcript: turn.transcript,
            response: turn.response,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Only stream events of agents in this channel.
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ParticipantQuery {
    /// Identifier of the joining human.
    pub participant: String,
    /// Rate of the PCM16 audio the client sends and expects. Defaults to 16000.
    pub sample_rate: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AckResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{AgentConfig, SessionId};

    #[test]
    fn test_agent_state_serialization() {
        let json = serde_json::to_string(&AgentState::from(SessionState::Responding)).unwrap();
        assert_eq!(json, "\"responding\"");
    }

    #[test]
    fn test_create_payload_defaults_to_empty_config() {
        let payload: CreateAgentPayload =
            serde_json::from_str(r#"{"channel":"market","agent_id":"vendor"}"#).unwrap();
        assert_eq!(payload.channel, "market");
        assert!(payload.config.persona_prompt.is_none());

        let config = AgentConfig::default().merged(&payload.config.into_patch(false));
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_update_payload_is_flat() {
        let payload: UpdateAgentPayload = serde_json::from_str(
            r#"{"persona_prompt":"grumpy","on_timeout":"end_session","reset_history":true}"#,
        )
        .unwrap();
        let patch = payload.config.into_patch(payload.reset_history);
        assert_eq!(patch.persona_prompt.as_deref(), Some("grumpy"));
        assert_eq!(patch.on_timeout, Some(TimeoutAction::EndSession));
        assert!(patch.reset_history);
        assert!(patch.greeting.is_none());
    }

    #[test]
    fn test_summary_flattens_handle() {
        let summary = SessionSummary {
            id: SessionId::new("market", "vendor"),
            instance: Uuid::nil(),
            created_at: Utc::now(),
            status: SessionStatus::default(),
        };
        let json = serde_json::to_value(AgentSummary::from(summary)).unwrap();
        assert_eq!(json["channel"], "market");
        assert_eq!(json["agent_id"], "vendor");
        assert_eq!(json["status"]["state"], "idle");
    }
}
