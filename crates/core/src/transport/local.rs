//! In-process channel hub.
//!
//! Humans open channels by joining them (typically over the API's WebSocket
//! endpoint); agents may only join channels that already carry at least one
//! human. Every frame a participant sends is fanned out to the other
//! participants, except that agents never hear each other. Agent speech waits
//! for room in each listener's queue; human audio is dropped when an agent's
//! queue is full. When the last human
//! leaves, the channel is torn down and the remaining agents see their inbound
//! stream close.

use super::{ParticipantRole, Transport, TransportLink};
use crate::{
    audio::{AudioFrame, DEFAULT_CHANNEL_SAMPLE_RATE},
    error::AgentError,
};
use async_trait::async_trait;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace, warn};

const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Participant {
    role: ParticipantRole,
    inbound_tx: mpsc::Sender<AudioFrame>,
    forwarder: JoinHandle<()>,
}

struct ChannelState {
    sample_rate: u32,
    participants: HashMap<String, Participant>,
}

impl ChannelState {
    fn has_humans(&self) -> bool {
        self.participants
            .values()
            .any(|p| p.role == ParticipantRole::Human)
    }
}

type Channels = Arc<Mutex<HashMap<String, ChannelState>>>;

/// Participants currently in a channel, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub sample_rate: u32,
    pub humans: Vec<String>,
    pub agents: Vec<String>,
}

#[derive(Clone)]
pub struct LocalTransport {
    channels: Channels,
    default_sample_rate: u32,
    queue_capacity: usize,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_SAMPLE_RATE)
    }
}

impl LocalTransport {
    pub fn new(default_sample_rate: u32) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            default_sample_rate,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Joins a channel as a human, opening it at `sample_rate` if it does not exist.
    pub fn join_human(
        &self,
        channel: &str,
        participant: &str,
        sample_rate: u32,
    ) -> Result<TransportLink, AgentError> {
        self.attach(channel, participant, ParticipantRole::Human, Some(sample_rate))
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        let channels = lock(&self.channels);
        let mut infos: Vec<ChannelInfo> = channels
            .iter()
            .map(|(name, state)| {
                let mut humans = Vec::new();
                let mut agents = Vec::new();
                for (id, participant) in &state.participants {
                    match participant.role {
                        ParticipantRole::Human => humans.push(id.clone()),
                        ParticipantRole::Agent => agents.push(id.clone()),
                    }
                }
                humans.sort();
                agents.sort();
                ChannelInfo {
                    name: name.clone(),
                    sample_rate: state.sample_rate,
                    humans,
                    agents,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn is_open(&self, channel: &str) -> bool {
        lock(&self.channels).contains_key(channel)
    }

    fn attach(
        &self,
        channel: &str,
        participant: &str,
        role: ParticipantRole,
        requested_rate: Option<u32>,
    ) -> Result<TransportLink, AgentError> {
        let mut channels = lock(&self.channels);

        let state = match (channels.contains_key(channel), role) {
            (true, _) => channels
                .get_mut(channel)
                .ok_or_else(|| AgentError::ChannelUnavailable(channel.to_string()))?,
            (false, ParticipantRole::Agent) => {
                return Err(AgentError::ChannelUnavailable(channel.to_string()));
            }
            (false, ParticipantRole::Human) => {
                info!(%channel, "Opening channel");
                channels.entry(channel.to_string()).or_insert(ChannelState {
                    sample_rate: requested_rate.unwrap_or(self.default_sample_rate),
                    participants: HashMap::new(),
                })
            }
        };

        if role == ParticipantRole::Agent && !state.has_humans() {
            return Err(AgentError::ChannelUnavailable(channel.to_string()));
        }
        if let Some(rate) = requested_rate {
            if rate != state.sample_rate {
                return Err(AgentError::ChannelUnavailable(format!(
                    "{channel} (runs at {}Hz, requested {rate}Hz)",
                    state.sample_rate
                )));
            }
        }
        if state.participants.contains_key(participant) {
            return Err(AgentError::NetworkError(format!(
                "participant '{participant}' already joined channel '{channel}'"
            )));
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(self.queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.queue_capacity);
        let forwarder = tokio::spawn(forward_frames(
            self.channels.clone(),
            channel.to_string(),
            participant.to_string(),
            role,
            outbound_rx,
        ));
        state.participants.insert(
            participant.to_string(),
            Participant {
                role,
                inbound_tx,
                forwarder,
            },
        );
        debug!(%channel, %participant, ?role, "Participant joined");

        Ok(TransportLink {
            channel: channel.to_string(),
            participant: participant.to_string(),
            sample_rate: state.sample_rate,
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }

    fn detach(&self, channel: &str, participant: &str) {
        let mut channels = lock(&self.channels);
        let Some(state) = channels.get_mut(channel) else {
            return;
        };
        if let Some(removed) = state.participants.remove(participant) {
            removed.forwarder.abort();
            debug!(%channel, %participant, "Participant left");
        }
        if !state.has_humans() {
            if let Some(closed) = channels.remove(channel) {
                for (agent, p) in closed.participants {
                    p.forwarder.abort();
                    debug!(%channel, %agent, "Disconnecting agent from closed channel");
                }
                info!(%channel, "Channel closed");
            }
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn join_channel(
        &self,
        channel: &str,
        participant: &str,
        role: ParticipantRole,
    ) -> Result<TransportLink, AgentError> {
        self.attach(channel, participant, role, None)
    }

    async fn leave_channel(&self, channel: &str, participant: &str) {
        self.detach(channel, participant);
    }
}

/// Drains one participant's outbound queue into everyone else's inbound queue.
async fn forward_frames(
    channels: Channels,
    channel: String,
    sender: String,
    role: ParticipantRole,
    mut outbound: mpsc::Receiver<AudioFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        let targets: Vec<(String, mpsc::Sender<AudioFrame>)> = {
            let channels = lock(&channels);
            let Some(state) = channels.get(&channel) else {
                break;
            };
            state
                .participants
                .iter()
                .filter(|(id, p)| {
                    *id != &sender
                        && !(role == ParticipantRole::Agent && p.role == ParticipantRole::Agent)
                })
                .map(|(id, p)| (id.clone(), p.inbound_tx.clone()))
                .collect()
        };
        for (target, tx) in targets {
            if role == ParticipantRole::Agent {
                if tx.send(frame.clone()).await.is_err() {
                    trace!(%channel, to = %target, "Receiver gone");
                }
                continue;
            }
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%channel, from = %sender, to = %target, "Inbound queue full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(%channel, to = %target, "Receiver gone");
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
