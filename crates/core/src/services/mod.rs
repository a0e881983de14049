//! Contracts for the external speech and language services a turn depends on.
//!
//! Each service is a plain request/response call that either succeeds or
//! fails with a [`ServiceError`]. The pipeline owns timeouts and fallback
//! behaviour, so implementations should not retry on their own.

pub mod openai;

use crate::{
    audio::SynthesizedSpeech, context::Turn, error::ServiceError, vad::Utterance,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Input to a response generator for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub persona_prompt: String,
    /// Prior turns, oldest first, already bounded by the session's history depth.
    pub history: Vec<Turn>,
    pub transcript: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Returns the transcript of a whole utterance. An empty string means no words.
    async fn transcribe(&self, utterance: &Utterance) -> Result<String, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, ServiceError>;
}

/// The service set shared by every session a controller runs.
#[derive(Clone)]
pub struct Services {
    pub stt: Arc<dyn SpeechToText>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Services {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            stt,
            generator,
            synthesizer,
        }
    }
}
