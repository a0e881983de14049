//! Binds agent sessions to channels on a [`Transport`].

use crate::{
    audio::AudioFrame,
    error::AgentError,
    session::SessionId,
    transport::{ParticipantRole, Transport},
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

/// The audio streams handed to a session's turn pipeline after joining.
#[derive(Debug)]
pub struct MediaStreams {
    pub sample_rate: u32,
    pub inbound: mpsc::Receiver<AudioFrame>,
    pub outbound: mpsc::Sender<AudioFrame>,
}

#[derive(Debug, Clone)]
struct Binding {
    channel: String,
    participant: String,
    instance: Uuid,
}

/// Tracks which session occupies which channel slot. Each binding is owned by
/// exactly one session and is never shared.
pub struct MediaRouter {
    transport: Arc<dyn Transport>,
    bindings: Mutex<HashMap<SessionId, Binding>>,
}

impl MediaRouter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Joins the session's agent to `channel`.
    pub async fn join(
        &self,
        session_id: &SessionId,
        channel: &str,
        role: ParticipantRole,
    ) -> Result<MediaStreams, AgentError> {
        self.join_instance(session_id, Uuid::nil(), channel, role)
            .await
    }

    pub(crate) async fn join_instance(
        &self,
        session_id: &SessionId,
        instance: Uuid,
        channel: &str,
        role: ParticipantRole,
    ) -> Result<MediaStreams, AgentError> {
        let mut bindings = self.bindings.lock().await;
        if bindings.contains_key(session_id) {
            return Err(AgentError::DuplicateSession(session_id.clone()));
        }

        let link = self
            .transport
            .join_channel(channel, &session_id.agent_id, role)
            .await?;
        info!(session_id = %session_id, %channel, sample_rate = link.sample_rate, "Joined channel");

        bindings.insert(
            session_id.clone(),
            Binding {
                channel: link.channel.clone(),
                participant: link.participant.clone(),
                instance,
            },
        );
        Ok(MediaStreams {
            sample_rate: link.sample_rate,
            inbound: link.inbound,
            outbound: link.outbound,
        })
    }

    /// Leaves the session's channel. Idempotent.
    pub async fn leave(&self, session_id: &SessionId) {
        let binding = self.bindings.lock().await.remove(session_id);
        self.release(session_id, binding).await;
    }

    /// Leaves only if the binding still belongs to `instance`, so a stale
    /// teardown cannot detach a newer session that reuses the same id.
    pub(crate) async fn leave_instance(&self, session_id: &SessionId, instance: Uuid) {
        let binding = {
            let mut bindings = self.bindings.lock().await;
            match bindings.get(session_id) {
                Some(binding) if binding.instance == instance => bindings.remove(session_id),
                _ => None,
            }
        };
        self.release(session_id, binding).await;
    }

    pub async fn is_joined(&self, session_id: &SessionId) -> bool {
        self.bindings.lock().await.contains_key(session_id)
    }

    async fn release(&self, session_id: &SessionId, binding: Option<Binding>) {
        match binding {
            Some(binding) => {
                self.transport
                    .leave_channel(&binding.channel, &binding.participant)
                    .await;
                info!(session_id = %session_id, channel = %binding.channel, "Left channel");
            }
            None => debug!(session_id = %session_id, "Leave requested for unbound session"),
        }
    }
}
