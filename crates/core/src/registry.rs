//! The single source of truth for which agent sessions exist.

use crate::{
    config::{AgentConfig, AgentConfigPatch},
    context::{Turn, TurnContext},
    error::AgentError,
    session::{SessionHandle, SessionId, SessionState, SessionStatus, SessionSummary},
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};
use tokio::{
    sync::{Notify, RwLock as AsyncRwLock, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// State shared between a registry entry and its pipeline. Locks are only
/// held for the duration of a copy, never across an await.
#[derive(Debug)]
pub(crate) struct SessionShared {
    context: RwLock<TurnContext>,
    config: RwLock<Arc<AgentConfig>>,
    /// Updates not yet picked up by the pipeline, merged into one.
    pending: Mutex<Option<AgentConfigPatch>>,
    update_ready: Notify,
}

impl SessionShared {
    fn new(config: AgentConfig) -> Self {
        Self {
            context: RwLock::new(TurnContext::new(config.history_depth)),
            config: RwLock::new(Arc::new(config)),
            pending: Mutex::new(None),
            update_ready: Notify::new(),
        }
    }

    fn queue_update(&self, patch: AgentConfigPatch) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = Some(match pending.take() {
            Some(earlier) => earlier.then(patch),
            None => patch,
        });
        drop(pending);
        self.update_ready.notify_one();
    }

    pub(crate) fn take_update(&self) -> Option<AgentConfigPatch> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Resolves once an update has been queued since the last wake-up.
    pub(crate) async fn update_queued(&self) {
        self.update_ready.notified().await;
    }

    pub(crate) fn config(&self) -> Arc<AgentConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace_config(&self, config: AgentConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    pub(crate) fn history(&self) -> Vec<Turn> {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .turns()
    }

    pub(crate) fn with_context<R>(&self, f: impl FnOnce(&mut TurnContext) -> R) -> R {
        let mut context = self.context.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut context)
    }
}

/// The pipeline's half of a newly created session.
pub(crate) struct PipelineEndpoints {
    pub status: watch::Sender<SessionStatus>,
    pub cancel: CancellationToken,
    pub shared: Arc<SessionShared>,
}

/// The registry's half of a session.
pub(crate) struct SessionEntry {
    pub handle: SessionHandle,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
    shared: Arc<SessionShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionEntry {
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn history(&self) -> Vec<Turn> {
        self.shared.history()
    }

    pub fn config(&self) -> Arc<AgentConfig> {
        self.shared.config()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.handle.id.clone(),
            instance: self.handle.instance,
            created_at: self.handle.created_at,
            status: self.status(),
        }
    }

    /// Queues an update without waiting for the pipeline. Updates queued
    /// during one turn are merged and applied together. Fails with `NotFound`
    /// once the pipeline has exited.
    pub fn request_update(&self, patch: AgentConfigPatch) -> Result<(), AgentError> {
        let ended = self.status.has_changed().is_err()
            || self.status.borrow().state == SessionState::Ended;
        if ended {
            return Err(AgentError::NotFound(self.handle.id.clone()));
        }
        self.shared.queue_update(patch);
        Ok(())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn set_task(&self, handle: JoinHandle<()>) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Concurrent map of live sessions keyed by `(channel, agent_id)`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: AsyncRwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session in `Idle`. Fails if the id is already taken.
    pub(crate) async fn create(
        &self,
        id: SessionId,
        config: AgentConfig,
    ) -> Result<(Arc<SessionEntry>, PipelineEndpoints), AgentError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(AgentError::DuplicateSession(id));
        }

        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let cancel = CancellationToken::new();
        let shared = Arc::new(SessionShared::new(config));

        let entry = Arc::new(SessionEntry {
            handle: SessionHandle {
                id: id.clone(),
                instance: Uuid::new_v4(),
                created_at: Utc::now(),
            },
            status: status_rx,
            cancel: cancel.clone(),
            shared: shared.clone(),
            task: Mutex::new(None),
        });
        sessions.insert(id, entry.clone());

        Ok((
            entry,
            PipelineEndpoints {
                status: status_tx,
                cancel,
                shared,
            },
        ))
    }

    pub async fn get(&self, id: &SessionId) -> Result<SessionStatus, AgentError> {
        self.entry(id)
            .await
            .map(|entry| entry.status())
            .ok_or_else(|| AgentError::NotFound(id.clone()))
    }

    pub(crate) async fn entry(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Removes a session. Removing an absent session is a no-op.
    pub async fn remove(&self, id: &SessionId) -> bool {
        self.take(id).await.is_some()
    }

    pub(crate) async fn take(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.write().await.remove(id)
    }

    /// Removes the session only if it is still the given incarnation.
    pub(crate) async fn take_instance(
        &self,
        id: &SessionId,
        instance: Uuid,
    ) -> Option<Arc<SessionEntry>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(entry) if entry.handle.instance == instance => sessions.remove(id),
            _ => None,
        }
    }

    /// Snapshot of every session, ordered by id.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let entries: Vec<Arc<SessionEntry>> =
            self.sessions.read().await.values().cloned().collect();
        let mut summaries: Vec<SessionSummary> = entries.iter().map(|e| e.summary()).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub(crate) async fn drain(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.write().await.drain().map(|(_, e)| e).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
