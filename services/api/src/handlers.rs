//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for agent management
//! and the server-sent event stream. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::Stream;
use parley_core::{AgentError, AgentEvent, CreateAgentRequest, SessionId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{error, info, warn};

use crate::{
    models::{
        AckResponse, AgentHandle, AgentStatus, AgentSummary, CreateAgentPayload, ErrorResponse,
        EventsQuery, TurnRecord, UpdateAgentPayload,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
    InternalServerError(anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::BadGateway(message)
            | ApiError::ServiceUnavailable(message)
            | ApiError::GatewayTimeout(message) => message,
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                "An internal server error occurred.".to_string()
            }
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let message = err.to_string();
        match err {
            AgentError::InvalidConfig(_) => ApiError::BadRequest(message),
            AgentError::NotFound(_) => ApiError::NotFound(message),
            AgentError::DuplicateSession(_) => ApiError::Conflict(message),
            AgentError::ChannelUnavailable(_) => ApiError::ServiceUnavailable(message),
            AgentError::NetworkError(_) => ApiError::BadGateway(message),
            AgentError::Timeout(_) => ApiError::GatewayTimeout(message),
            AgentError::ServiceError(_) => ApiError::InternalServerError(err.into()),
        }
    }
}

/// Create an agent and join it to a channel.
#[utoipa::path(
    post,
    path = "/agents",
    request_body = CreateAgentPayload,
    responses(
        (status = 201, description = "Agent created and listening", body = AgentHandle),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 409, description = "An agent with this id is already in the channel", body = ErrorResponse),
        (status = 502, description = "The channel transport failed", body = ErrorResponse),
        (status = 503, description = "The channel cannot be joined", body = ErrorResponse)
    )
)]
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAgentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state
        .agent_defaults
        .merged(&payload.config.into_patch(false));
    let request = CreateAgentRequest::new(payload.channel, payload.agent_id, config);
    let handle = state.controller.create_agent(request).await?;
    info!(session_id = %handle.id, "Agent created via API");
    Ok((StatusCode::CREATED, Json(AgentHandle::from(handle))))
}

/// List every live agent.
#[utoipa::path(
    get,
    path = "/agents",
    responses(
        (status = 200, description = "List of agents", body = [AgentSummary])
    )
)]
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentSummary>> {
    let agents = state.controller.list_agents().await;
    Json(agents.into_iter().map(AgentSummary::from).collect())
}

/// Get the status of an agent.
#[utoipa::path(
    get,
    path = "/agents/{channel}/{agent_id}",
    responses(
        (status = 200, description = "Agent status", body = AgentStatus),
        (status = 404, description = "Agent not found", body = ErrorResponse)
    ),
    params(
        ("channel" = String, Path, description = "Channel the agent is in"),
        ("agent_id" = String, Path, description = "Agent identifier within the channel")
    )
)]
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path((channel, agent_id)): Path<(String, String)>,
) -> Result<Json<AgentStatus>, ApiError> {
    let status = state
        .controller
        .get_status(&SessionId::new(channel, agent_id))
        .await?;
    Ok(Json(status.into()))
}

/// Change an agent's configuration. Applied at the next turn boundary.
#[utoipa::path(
    patch,
    path = "/agents/{channel}/{agent_id}",
    request_body = UpdateAgentPayload,
    responses(
        (status = 202, description = "Update queued", body = AckResponse),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 404, description = "Agent not found", body = ErrorResponse)
    ),
    params(
        ("channel" = String, Path, description = "Channel the agent is in"),
        ("agent_id" = String, Path, description = "Agent identifier within the channel")
    )
)]
pub async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path((channel, agent_id)): Path<(String, String)>,
    Json(payload): Json<UpdateAgentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let id = SessionId::new(channel, agent_id);
    let patch = payload.config.into_patch(payload.reset_history);
    state.controller.update_agent(&id, patch).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AckResponse {
            message: format!("Update for '{}' queued", id),
        }),
    ))
}

/// Stop an agent and remove it from its channel. Stopping twice is not an error.
#[utoipa::path(
    delete,
    path = "/agents/{channel}/{agent_id}",
    responses(
        (status = 200, description = "Agent stopped", body = AckResponse)
    ),
    params(
        ("channel" = String, Path, description = "Channel the agent is in"),
        ("agent_id" = String, Path, description = "Agent identifier within the channel")
    )
)]
pub async fn stop_agent(
    State(state): State<Arc<AppState>>,
    Path((channel, agent_id)): Path<(String, String)>,
) -> Result<Json<AckResponse>, ApiError> {
    let id = SessionId::new(channel, agent_id);
    state.controller.stop_agent(&id).await?;
    Ok(Json(AckResponse {
        message: format!("Agent '{}' stopped", id),
    }))
}

/// Get the conversation history an agent currently remembers, oldest first.
#[utoipa::path(
    get,
    path = "/agents/{channel}/{agent_id}/history",
    responses(
        (status = 200, description = "Remembered turns", body = [TurnRecord]),
        (status = 404, description = "Agent not found", body = ErrorResponse)
    ),
    params(
        ("channel" = String, Path, description = "Channel the agent is in"),
        ("agent_id" = String, Path, description = "Agent identifier within the channel")
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path((channel, agent_id)): Path<(String, String)>,
) -> Result<Json<Vec<TurnRecord>>, ApiError> {
    let history = state
        .controller
        .history(&SessionId::new(channel, agent_id))
        .await?;
    Ok(Json(history.into_iter().map(TurnRecord::from).collect()))
}

/// Stream agent events as server-sent events.
#[utoipa::path(
    get,
    path = "/events",
    responses(
        (status = 200, description = "Stream of agent events", content_type = "text/event-stream", body = String)
    ),
    params(EventsQuery)
)]
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = channel_events(state.controller.subscribe(), query.channel)
        .map(|event| Event::default().event(event.name()).json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Agent events, optionally restricted to one channel. Lagging subscribers
/// skip what they missed.
pub(crate) fn channel_events(
    events: broadcast::Receiver<AgentEvent>,
    channel: Option<String>,
) -> impl Stream<Item = AgentEvent> {
    BroadcastStream::new(events).filter_map(move |item| match item {
        Ok(event) => {
            if channel
                .as_deref()
                .is_some_and(|wanted| event.session_id().channel != wanted)
            {
                return None;
            }
            Some(event)
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "Event subscriber lagged, events dropped");
            None
        }
    })
}
