//! Real-time channel transport primitives consumed by the media router.
//!
//! A transport lets a participant join a named channel and exchange PCM16
//! frames with everyone else in it. Joining yields a [`TransportLink`]: frames
//! from other participants arrive on `inbound` in arrival order, and frames
//! pushed into `outbound` are delivered to the channel in send order.

pub mod local;

use crate::{audio::AudioFrame, error::AgentError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use local::LocalTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Human,
    Agent,
}

/// A participant's connection to a channel.
#[derive(Debug)]
pub struct TransportLink {
    pub channel: String,
    pub participant: String,
    /// Rate of the audio carried by the channel.
    pub sample_rate: u32,
    pub inbound: mpsc::Receiver<AudioFrame>,
    pub outbound: mpsc::Sender<AudioFrame>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Joins `channel` as `participant`.
    ///
    /// Fails with `ChannelUnavailable` when the channel cannot accept the
    /// participant, or `NetworkError` when the transport itself fails.
    async fn join_channel(
        &self,
        channel: &str,
        participant: &str,
        role: ParticipantRole,
    ) -> Result<TransportLink, AgentError>;

    /// Leaves `channel`. Leaving a channel one is not in is a no-op.
    async fn leave_channel(&self, channel: &str, participant: &str);
}
