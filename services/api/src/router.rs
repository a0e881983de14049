//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the event stream, the participant WebSocket, and
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AckResponse, AgentConfigPayload, AgentHandle, AgentState, AgentStatus, AgentSummary,
        CreateAgentPayload, ErrorResponse, OnTimeout, TurnRecord, UpdateAgentPayload,
    },
    state::AppState,
    ws::{self, ws_handler},
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_agent,
        handlers::list_agents,
        handlers::get_agent,
        handlers::update_agent,
        handlers::stop_agent,
        handlers::get_history,
        handlers::stream_events,
        ws::session::ws_handler,
    ),
    components(
        schemas(
            AgentHandle, AgentStatus, AgentSummary, AgentState, AgentConfigPayload,
            CreateAgentPayload, UpdateAgentPayload, OnTimeout, TurnRecord, AckResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Parley API", description = "Lifecycle management for conversational voice agents")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(
            "/agents",
            get(handlers::list_agents).post(handlers::create_agent),
        )
        .route(
            "/agents/{channel}/{agent_id}",
            get(handlers::get_agent)
                .patch(handlers::update_agent)
                .delete(handlers::stop_agent),
        )
        .route(
            "/agents/{channel}/{agent_id}/history",
            get(handlers::get_history),
        )
        .route("/events", get(handlers::stream_events))
        .route("/channels/{channel}/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
