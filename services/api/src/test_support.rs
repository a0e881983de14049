//! Silent services and an application state wired to a local hub.

use crate::{
    config::{Config, Provider},
    state::AppState,
};
use async_trait::async_trait;
use parley_core::{
    AgentConfig, AgentController, CreateAgentRequest, LocalTransport, ServiceError, Services,
    audio::SynthesizedSpeech,
    services::{GenerationRequest, ResponseGenerator, SpeechSynthesizer, SpeechToText},
    vad::Utterance,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::Level;

/// Hears nothing and says almost nothing.
pub struct Silent;

#[async_trait]
impl SpeechToText for Silent {
    async fn transcribe(&self, _utterance: &Utterance) -> Result<String, ServiceError> {
        Ok(String::new())
    }
}

#[async_trait]
impl ResponseGenerator for Silent {
    async fn generate(&self, _request: GenerationRequest) -> Result<String, ServiceError> {
        Ok("...".to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for Silent {
    async fn synthesize(&self, _text: &str) -> Result<SynthesizedSpeech, ServiceError> {
        Ok(SynthesizedSpeech {
            samples: vec![0; 480],
            sample_rate: 24_000,
        })
    }
}

pub fn test_config() -> Config {
    Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        provider: Provider::OpenAI,
        openai_api_key: Some("test".to_string()),
        gemini_api_key: None,
        chat_model: "gpt-4o".to_string(),
        transcription_model: "whisper-1".to_string(),
        speech_model: "tts-1".to_string(),
        speech_voice: "alloy".to_string(),
        log_level: Level::INFO,
        join_timeout: Duration::from_secs(5),
        response_timeout_ms: 10_000,
        max_consecutive_failures: 3,
        pace_playback: false,
    }
}

pub fn app_state() -> Arc<AppState> {
    let config = test_config();
    let hub = LocalTransport::default();
    let services = Services::new(Arc::new(Silent), Arc::new(Silent), Arc::new(Silent));
    let controller =
        AgentController::new(Arc::new(hub.clone()), services, config.controller_settings());
    Arc::new(AppState {
        controller: Arc::new(controller),
        hub,
        agent_defaults: Arc::new(config.agent_defaults()),
    })
}

/// Creates an agent with default settings in a channel that already has a human.
pub async fn create_test_agent(state: &AppState, channel: &str, agent_id: &str) {
    state
        .controller
        .create_agent(CreateAgentRequest::new(channel, agent_id, AgentConfig::default()))
        .await
        .unwrap();
}
