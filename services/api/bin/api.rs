//! Main Entrypoint for the Parley API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the speech and language services for the configured provider.
//! 3. Constructing the local channel hub and the agent controller.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and stopping every agent on shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use parley_api::{
    config::{Config, Provider},
    router::create_router,
    state::AppState,
};
use parley_core::{AgentController, LocalTransport, services::openai::openai_services};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Waits for `Ctrl+C`, then stops every agent so their channels are released
/// before the server drains its connections.
async fn shutdown_signal(controller: Arc<AgentController>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
    controller.shutdown().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    match config.provider {
        Provider::OpenAI => info!("Using OpenAI provider."),
        Provider::Gemini => info!("Using Gemini provider."),
    }
    let (api_key, api_base) = config.provider_endpoint();
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base);
    let services = openai_services(openai_config, config.models());

    let hub = LocalTransport::default();
    let controller = Arc::new(AgentController::new(
        Arc::new(hub.clone()),
        services,
        config.controller_settings(),
    ));

    let app_state = Arc::new(AppState {
        controller: controller.clone(),
        hub,
        agent_defaults: Arc::new(config.agent_defaults()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 5. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(controller))
    .await?;

    info!("Server has shut down.");
    Ok(())
}
