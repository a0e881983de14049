//! Service implementations for any OpenAI-compatible API.

use super::{GenerationRequest, ResponseGenerator, Services, SpeechSynthesizer, SpeechToText};
use crate::{
    audio::{OPENAI_SPEECH_SAMPLE_RATE, SynthesizedSpeech, encode_wav, pcm16_from_le_bytes},
    error::ServiceError,
    vad::Utterance,
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        AudioInput, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateSpeechRequestArgs, CreateTranscriptionRequestArgs,
        SpeechModel, SpeechResponseFormat, Voice,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

impl From<OpenAIError> for ServiceError {
    fn from(err: OpenAIError) -> Self {
        ServiceError::Failed(err.to_string())
    }
}

/// Model selection for the three OpenAI-backed services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiModels {
    pub chat: String,
    pub transcription: String,
    pub speech: String,
    pub voice: String,
}

impl Default for OpenAiModels {
    fn default() -> Self {
        Self {
            chat: "gpt-4o".to_string(),
            transcription: "whisper-1".to_string(),
            speech: "tts-1".to_string(),
            voice: "alloy".to_string(),
        }
    }
}

/// Builds the full service set against one OpenAI-compatible endpoint.
pub fn openai_services(config: OpenAIConfig, models: OpenAiModels) -> Services {
    let client = Client::with_config(config);
    Services::new(
        Arc::new(OpenAiTranscriber {
            client: client.clone(),
            model: models.transcription,
        }),
        Arc::new(OpenAiResponseGenerator {
            client: client.clone(),
            model: models.chat,
        }),
        Arc::new(OpenAiSpeechSynthesizer {
            client,
            model: models.speech,
            voice: models.voice,
        }),
    )
}

pub struct OpenAiTranscriber {
    client: Client<OpenAIConfig>,
    model: String,
}

#[async_trait]
impl SpeechToText for OpenAiTranscriber {
    async fn transcribe(&self, utterance: &Utterance) -> Result<String, ServiceError> {
        let wav = encode_wav(&utterance.samples, utterance.sample_rate);
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8("utterance.wav".to_string(), wav))
            .model(&self.model)
            .build()?;
        let response = self.client.audio().transcribe(request).await?;
        debug!(chars = response.text.len(), "Transcription received");
        Ok(response.text.trim().to_string())
    }
}

/// Chat-completion backed response generator.
pub struct OpenAiResponseGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

#[async_trait]
impl ResponseGenerator for OpenAiResponseGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ServiceError> {
        let messages = build_messages(&request)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()?;
        let response = self.client.chat().create(request).await?;
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Failed("LLM response had no text content".to_string()))
    }
}

/// Persona as the system message, then prior turns, then the new transcript.
fn build_messages(
    request: &GenerationRequest,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
    if !request.persona_prompt.is_empty() {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.persona_prompt.clone())
                .build()?
                .into(),
        );
    }
    for turn in &request.history {
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(turn.transcript.clone())
                .build()?
                .into(),
        );
        messages.push(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.response.clone())
                .build()?
                .into(),
        );
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(request.transcript.clone())
            .build()?
            .into(),
    );
    Ok(messages)
}

pub struct OpenAiSpeechSynthesizer {
    client: Client<OpenAIConfig>,
    model: String,
    voice: String,
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, ServiceError> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(speech_model(&self.model))
            .voice(voice(&self.voice))
            .response_format(SpeechResponseFormat::Pcm)
            .build()?;
        let response = self.client.audio().speech(request).await?;
        Ok(SynthesizedSpeech {
            samples: pcm16_from_le_bytes(&response.bytes),
            sample_rate: OPENAI_SPEECH_SAMPLE_RATE,
        })
    }
}

fn speech_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn voice(name: &str) -> Voice {
    match name.to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        other => {
            warn!(voice = %other, "Unknown voice, using alloy");
            Voice::Alloy
        }
    }
}
