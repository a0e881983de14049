//! Manages the WebSocket connection lifecycle of a human participant.

use super::protocol::{ClientMessage, ServerMessage};
use crate::{
    handlers::ApiError,
    models::{ErrorResponse, ParticipantQuery},
    state::AppState,
};
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parley_core::{
    AgentEvent, Transport, TransportLink,
    audio::{AudioFrame, DEFAULT_CHANNEL_SAMPLE_RATE, decode_i16},
    config::validate_identifier,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, instrument, warn};

const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 48_000;

/// Join a channel as a human participant.
///
/// Upgrades to a WebSocket carrying binary PCM16LE frames in both directions
/// and JSON control messages. Agent events for the channel are forwarded as
/// `event` messages.
#[utoipa::path(
    get,
    path = "/channels/{channel}/ws",
    responses(
        (status = 101, description = "Switching to the participant WebSocket"),
        (status = 400, description = "Invalid channel, participant or sample rate", body = ErrorResponse)
    ),
    params(
        ("channel" = String, Path, description = "Channel to join, opened if absent"),
        ParticipantQuery
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(query): Query<ParticipantQuery>,
) -> Result<Response, ApiError> {
    validate_identifier("channel", &channel)?;
    validate_identifier("participant", &query.participant)?;
    let sample_rate = query.sample_rate.unwrap_or(DEFAULT_CHANNEL_SAMPLE_RATE);
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(ApiError::BadRequest(format!(
            "sample_rate must be between {} and {}",
            MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        )));
    }
    let participant = query.participant;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, channel, participant, sample_rate)))
}

/// Joins the hub, bridges audio and events until either side goes away, then leaves.
#[instrument(name = "participant", skip(socket, state, sample_rate))]
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    channel: String,
    participant: String,
    sample_rate: u32,
) {
    let (mut socket_tx, mut socket_rx) = socket.split();
    let events = state.controller.subscribe();

    let link = match state.hub.join_human(&channel, &participant, sample_rate) {
        Ok(link) => link,
        Err(e) => {
            warn!(error = %e, "Participant could not join channel");
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            let _ = socket_tx.send(Message::Close(None)).await;
            return;
        }
    };

    let joined = ServerMessage::Joined {
        channel: channel.clone(),
        participant: participant.clone(),
        sample_rate: link.sample_rate,
    };
    if send_msg(&mut socket_tx, joined).await.is_ok() {
        info!("Participant joined channel.");
        if let Err(e) = bridge(&mut socket_tx, &mut socket_rx, link, events, &channel).await {
            error!(error = ?e, "Participant connection terminated with error.");
        }
    } else {
        error!("Failed to send Joined message to client.");
    }

    state.hub.leave_channel(&channel, &participant).await;
    info!("Participant left channel.");
}

/// The main event loop for a connected participant.
async fn bridge<S, R>(
    socket_tx: &mut S,
    socket_rx: &mut R,
    link: TransportLink,
    mut events: broadcast::Receiver<AgentEvent>,
    channel: &str,
) -> Result<()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let TransportLink {
        mut inbound,
        outbound,
        sample_rate,
        ..
    } = link;

    loop {
        tokio::select! {
            msg = socket_rx.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    outbound
                        .send(AudioFrame::from_le_bytes(&data, sample_rate))
                        .await
                        .map_err(|_| anyhow!("channel '{}' closed", channel))?;
                }
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Audio { data }) => {
                        let samples = decode_i16(&data);
                        if samples.is_empty() {
                            continue;
                        }
                        outbound
                            .send(AudioFrame::new(samples, sample_rate))
                            .await
                            .map_err(|_| anyhow!("channel '{}' closed", channel))?;
                    }
                    Ok(ClientMessage::Leave) => {
                        info!("Client asked to leave.");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed client message.");
                        send_msg(socket_tx, ServerMessage::Error { message: format!("Invalid message: {}", e) }).await?;
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection.");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    break;
                }
            },
            frame = inbound.recv() => match frame {
                Some(frame) => socket_tx.send(Message::Binary(frame.to_le_bytes().into())).await?,
                None => {
                    info!("Channel was torn down.");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) if event.session_id().channel == channel => {
                    send_msg(socket_tx, ServerMessage::Event { event }).await?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Participant lagged behind agent events."),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = socket_tx.send(Message::Close(None)).await;
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg<S>(socket_tx: &mut S, msg: ServerMessage) -> Result<()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
