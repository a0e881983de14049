//! Agent lifecycle: create, update, query and tear down sessions.
//!
//! The controller owns the session registry and the media router. Every
//! registry write goes through it and is serialized by the lifecycle lock, so
//! two creates can never race for the same channel slot.

use crate::{
    config::{AgentConfig, AgentConfigPatch, CreateAgentRequest},
    context::Turn,
    error::AgentError,
    events::{AgentEvent, EventBus},
    media::MediaRouter,
    pipeline::{PipelineSettings, TurnPipeline},
    registry::SessionRegistry,
    services::Services,
    session::{SessionHandle, SessionId, SessionState, SessionStatus, SessionSummary},
    transport::{ParticipantRole, Transport},
    vad::VadConfig,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{Instrument, debug, info, warn};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Bound on joining the channel and on the pipeline reaching `Listening`.
    pub join_timeout: Duration,
    /// How long `stop_agent` waits for the pipeline task before aborting it.
    pub stop_grace: Duration,
    pub pace_playback: bool,
    pub vad: VadConfig,
    pub event_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(5),
            pace_playback: true,
            vad: VadConfig::default(),
            event_capacity: 256,
        }
    }
}

pub struct AgentController {
    registry: Arc<SessionRegistry>,
    router: Arc<MediaRouter>,
    services: Services,
    events: EventBus,
    settings: ControllerSettings,
    lifecycle: Mutex<()>,
}

impl AgentController {
    pub fn new(
        transport: Arc<dyn Transport>,
        services: Services,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            router: Arc::new(MediaRouter::new(transport)),
            services,
            events: EventBus::new(settings.event_capacity),
            settings,
            lifecycle: Mutex::new(()),
        }
    }

    /// Validates the request, registers the session, joins its channel and
    /// starts its turn pipeline. Returns once the session is `Listening`.
    pub async fn create_agent(
        &self,
        request: CreateAgentRequest,
    ) -> Result<SessionHandle, AgentError> {
        request.validate()?;
        let _guard = self.lifecycle.lock().await;

        let id = SessionId::new(&request.channel, &request.agent_id);
        let (entry, endpoints) = self.registry.create(id.clone(), request.config).await?;
        let instance = entry.handle.instance;

        let joined = tokio::time::timeout(
            self.settings.join_timeout,
            self.router
                .join_instance(&id, instance, &request.channel, ParticipantRole::Agent),
        )
        .await;
        let media = match joined {
            Ok(Ok(media)) => media,
            Ok(Err(e)) => {
                self.registry.take_instance(&id, instance).await;
                warn!(session_id = %id, error = %e, "Failed to join channel");
                return Err(e);
            }
            Err(_) => {
                self.registry.take_instance(&id, instance).await;
                self.router.leave_instance(&id, instance).await;
                return Err(AgentError::NetworkError(format!(
                    "joining channel '{}' timed out",
                    request.channel
                )));
            }
        };

        let pipeline = TurnPipeline::new(
            id.clone(),
            self.services.clone(),
            media,
            endpoints,
            self.events.clone(),
            PipelineSettings {
                vad: self.settings.vad.clone(),
                pace_playback: self.settings.pace_playback,
            },
        );

        let registry = self.registry.clone();
        let router = self.router.clone();
        let events = self.events.clone();
        let session_id = id.clone();
        let session_span = tracing::info_span!("agent_session", %session_id, %instance);
        let handle = tokio::spawn(
            async move {
                let reason = pipeline.run().await;
                router.leave_instance(&session_id, instance).await;
                registry.take_instance(&session_id, instance).await;
                info!(?reason, "Agent session finished.");
                events.publish(AgentEvent::Ended { session_id, reason });
            }
            .instrument(session_span),
        );
        entry.set_task(handle);

        let mut status = entry.watch_status();
        let started = tokio::time::timeout(self.settings.join_timeout, async move {
            let ready = status
                .wait_for(|s| matches!(s.state, SessionState::Listening | SessionState::Ended))
                .await
                .map(|_| ());
            ready
        })
        .await;
        if started.is_err() {
            warn!(session_id = %id, "Pipeline did not start listening within the join timeout");
            entry.cancel();
            if let Some(task) = entry.take_task() {
                task.abort();
            }
            self.router.leave_instance(&id, instance).await;
            self.registry.take_instance(&id, instance).await;
            return Err(AgentError::Timeout(self.settings.join_timeout));
        }

        info!(session_id = %id, %instance, "Agent created");
        Ok(entry.handle.clone())
    }

    /// Ends the session and releases its channel slot. Stopping an unknown or
    /// already-stopped session succeeds.
    pub async fn stop_agent(&self, id: &SessionId) -> Result<(), AgentError> {
        let _guard = self.lifecycle.lock().await;
        let Some(entry) = self.registry.take(id).await else {
            debug!(session_id = %id, "Stop requested for absent session");
            return Ok(());
        };

        entry.cancel();
        if let Some(handle) = entry.take_task() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.settings.stop_grace, handle)
                .await
                .is_err()
            {
                warn!(session_id = %id, "Pipeline did not stop in time, aborting");
                abort.abort();
            }
        }
        self.router.leave_instance(id, entry.handle.instance).await;
        info!(session_id = %id, "Agent stopped");
        Ok(())
    }

    /// Queues a configuration change for the next turn boundary.
    pub async fn update_agent(
        &self,
        id: &SessionId,
        patch: AgentConfigPatch,
    ) -> Result<(), AgentError> {
        let entry = self
            .registry
            .entry(id)
            .await
            .ok_or_else(|| AgentError::NotFound(id.clone()))?;
        entry.config().merged(&patch).validate()?;
        entry.request_update(patch)?;
        debug!(session_id = %id, "Configuration update queued");
        Ok(())
    }

    pub async fn get_status(&self, id: &SessionId) -> Result<SessionStatus, AgentError> {
        self.registry.get(id).await
    }

    pub async fn list_agents(&self) -> Vec<SessionSummary> {
        self.registry.list().await
    }

    /// The session's current turn context, oldest first.
    pub async fn history(&self, id: &SessionId) -> Result<Vec<Turn>, AgentError> {
        self.registry
            .entry(id)
            .await
            .map(|entry| entry.history())
            .ok_or_else(|| AgentError::NotFound(id.clone()))
    }

    /// The configuration snapshot currently in effect.
    pub async fn config(&self, id: &SessionId) -> Result<Arc<AgentConfig>, AgentError> {
        self.registry
            .entry(id)
            .await
            .map(|entry| entry.config())
            .ok_or_else(|| AgentError::NotFound(id.clone()))
    }

    /// A receiver that observes every status change of one session.
    pub async fn watch(&self, id: &SessionId) -> Result<watch::Receiver<SessionStatus>, AgentError> {
        self.registry
            .entry(id)
            .await
            .map(|entry| entry.watch_status())
            .ok_or_else(|| AgentError::NotFound(id.clone()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Stops every session.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        let entries = self.registry.drain().await;
        info!(sessions = entries.len(), "Shutting down agent sessions");
        for entry in &entries {
            entry.cancel();
        }
        for entry in entries {
            if let Some(handle) = entry.take_task() {
                let abort = handle.abort_handle();
                if tokio::time::timeout(self.settings.stop_grace, handle)
                    .await
                    .is_err()
                {
                    abort.abort();
                }
            }
            self.router
                .leave_instance(&entry.handle.id, entry.handle.instance)
                .await;
        }
    }
}
