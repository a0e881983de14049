//! Per-agent persona configuration and partial updates.

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HISTORY_DEPTH: usize = 10;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
pub const DEFAULT_FALLBACK_TEXT: &str = "Sorry, I didn't catch that. Could you say it again?";

const MAX_IDENTIFIER_LEN: usize = 64;

/// What the pipeline does after speaking the fallback for a timed-out turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Go back to listening for the next utterance.
    #[default]
    Resume,
    /// End the session once the fallback has been delivered.
    EndSession,
}

/// Immutable snapshot of an agent's conversational behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Instructions handed to the response generator on every turn.
    pub persona_prompt: String,
    /// Spoken once after joining, before the first turn. Empty means silent.
    pub greeting: String,
    pub fallback_text: String,
    /// Number of completed turns kept as context. Zero makes each turn stateless.
    pub history_depth: usize,
    /// The session ends after this many turns. `None` means unbounded.
    pub max_turns: Option<u32>,
    pub response_timeout_ms: u64,
    pub on_timeout: TimeoutAction,
    pub max_consecutive_failures: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona_prompt: String::new(),
            greeting: String::new(),
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
            history_depth: DEFAULT_HISTORY_DEPTH,
            max_turns: None,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            on_timeout: TimeoutAction::Resume,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl AgentConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.response_timeout_ms == 0 {
            return Err(AgentError::InvalidConfig(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_turns == Some(0) {
            return Err(AgentError::InvalidConfig(
                "max_turns must be greater than zero when set".to_string(),
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err(AgentError::InvalidConfig(
                "max_consecutive_failures must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Produces the snapshot that results from applying `patch`.
    pub fn merged(&self, patch: &AgentConfigPatch) -> AgentConfig {
        let mut next = self.clone();
        if let Some(prompt) = &patch.persona_prompt {
            next.persona_prompt = prompt.clone();
        }
        if let Some(greeting) = &patch.greeting {
            next.greeting = greeting.clone();
        }
        if let Some(fallback) = &patch.fallback_text {
            next.fallback_text = fallback.clone();
        }
        if let Some(depth) = patch.history_depth {
            next.history_depth = depth;
        }
        match patch.max_turns {
            Some(0) => next.max_turns = None,
            Some(max_turns) => next.max_turns = Some(max_turns),
            None => {}
        }
        if let Some(timeout) = patch.response_timeout_ms {
            next.response_timeout_ms = timeout;
        }
        if let Some(action) = patch.on_timeout {
            next.on_timeout = action;
        }
        if let Some(limit) = patch.max_consecutive_failures {
            next.max_consecutive_failures = limit;
        }
        next
    }
}

/// A partial configuration update. Absent fields keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfigPatch {
    pub persona_prompt: Option<String>,
    pub greeting: Option<String>,
    pub fallback_text: Option<String>,
    pub history_depth: Option<usize>,
    /// A new turn limit. `Some(0)` lifts the limit.
    pub max_turns: Option<u32>,
    pub response_timeout_ms: Option<u64>,
    pub on_timeout: Option<TimeoutAction>,
    pub max_consecutive_failures: Option<u32>,
    /// Clear the turn context when the update is applied.
    pub reset_history: bool,
}

impl AgentConfigPatch {
    /// Combines two pending updates into one. Fields set in `later` win.
    pub fn then(self, later: AgentConfigPatch) -> AgentConfigPatch {
        AgentConfigPatch {
            persona_prompt: later.persona_prompt.or(self.persona_prompt),
            greeting: later.greeting.or(self.greeting),
            fallback_text: later.fallback_text.or(self.fallback_text),
            history_depth: later.history_depth.or(self.history_depth),
            max_turns: later.max_turns.or(self.max_turns),
            response_timeout_ms: later.response_timeout_ms.or(self.response_timeout_ms),
            on_timeout: later.on_timeout.or(self.on_timeout),
            max_consecutive_failures: later
                .max_consecutive_failures
                .or(self.max_consecutive_failures),
            reset_history: self.reset_history || later.reset_history,
        }
    }
}

/// Everything needed to place a new agent in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    pub channel: String,
    pub agent_id: String,
    #[serde(default)]
    pub config: AgentConfig,
}

impl CreateAgentRequest {
    pub fn new(channel: impl Into<String>, agent_id: impl Into<String>, config: AgentConfig) -> Self {
        Self {
            channel: channel.into(),
            agent_id: agent_id.into(),
            config,
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        validate_identifier("channel", &self.channel)?;
        validate_identifier("agent_id", &self.agent_id)?;
        self.config.validate()
    }
}

/// Channel names and agent ids: 1-64 chars of `[A-Za-z0-9._:-]`.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), AgentError> {
    if value.is_empty() {
        return Err(AgentError::InvalidConfig(format!("{field} must not be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(AgentError::InvalidConfig(format!(
            "{field} must be at most {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-')))
    {
        return Err(AgentError::InvalidConfig(format!(
            "{field} contains invalid character '{bad}'"
        )));
    }
    Ok(())
}
