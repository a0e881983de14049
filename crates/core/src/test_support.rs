//! Fakes and a channel harness shared by the controller and pipeline tests.

use crate::{
    audio::{AudioFrame, SynthesizedSpeech},
    controller::{AgentController, ControllerSettings},
    error::ServiceError,
    events::{AgentEvent, EndReason},
    services::{GenerationRequest, ResponseGenerator, Services, SpeechSynthesizer, SpeechToText},
    session::{SessionState, SessionStatus},
    transport::{LocalTransport, TransportLink},
    vad::Utterance,
};
use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, watch};

const CHANNEL: &str = "plaza";
const VISITOR: &str = "visitor";
const RATE: u32 = 16_000;

/// Returns "utterance 1", "utterance 2", ... for successive calls.
#[derive(Default)]
pub struct CountingTranscriber {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechToText for CountingTranscriber {
    async fn transcribe(&self, _utterance: &Utterance) -> Result<String, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("utterance {n}"))
    }
}

/// Replies "reply to <transcript>" after an optional delay, recording the
/// persona of every request and the peak number of overlapping calls.
#[derive(Default)]
pub struct ScriptedGenerator {
    delay: Duration,
    active: AtomicUsize,
    peak: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn peak_concurrency(&self) -> Arc<AtomicUsize> {
        self.peak.clone()
    }

    pub fn seen_prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ServiceError> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push(request.persona_prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("reply to {}", request.transcript))
    }
}

/// 100ms of a square wave at the OpenAI speech rate.
pub struct ToneSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ToneSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<SynthesizedSpeech, ServiceError> {
        let samples = (0..2_400)
            .map(|i| if (i / 30) % 2 == 0 { 4_000 } else { -4_000 })
            .collect();
        Ok(SynthesizedSpeech {
            samples,
            sample_rate: 24_000,
        })
    }
}

/// A controller on a local hub with one human already in the channel.
pub struct Harness {
    pub controller: AgentController,
    pub hub: LocalTransport,
    speaker: mpsc::Sender<AudioFrame>,
    listener: AsyncMutex<mpsc::Receiver<AudioFrame>>,
}

impl Harness {
    pub async fn new(services: Services) -> Self {
        let hub = LocalTransport::new(RATE).with_queue_capacity(4_096);
        let TransportLink {
            inbound, outbound, ..
        } = hub.join_human(CHANNEL, VISITOR, RATE).unwrap();
        let controller = AgentController::new(
            Arc::new(hub.clone()),
            services,
            ControllerSettings::default(),
        );
        Self {
            controller,
            hub,
            speaker: outbound,
            listener: AsyncMutex::new(inbound),
        }
    }

    pub fn default_services() -> Services {
        Services::new(
            Arc::new(CountingTranscriber::default()),
            Arc::new(ScriptedGenerator::default()),
            Arc::new(ToneSynthesizer),
        )
    }

    /// 200ms of loud audio followed by enough silence to close the utterance.
    pub async fn say_something(&self) {
        for _ in 0..10 {
            self.speaker
                .send(AudioFrame::new(vec![3_000; 320], RATE))
                .await
                .unwrap();
        }
        for _ in 0..25 {
            self.speaker
                .send(AudioFrame::new(vec![0; 320], RATE))
                .await
                .unwrap();
        }
    }

    /// Number of frames the human has heard since the last call.
    pub async fn received_audio(&self) -> usize {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut listener = self.listener.lock().await;
        let mut frames = 0;
        while listener.try_recv().is_ok() {
            frames += 1;
        }
        frames
    }

    /// Waits until `turns` turns are counted and the pipeline has settled.
    pub async fn wait_for_turns(status: &mut watch::Receiver<SessionStatus>, turns: u32) {
        status
            .wait_for(|s| {
                s.turn_count >= turns
                    && matches!(s.state, SessionState::Listening | SessionState::Ended)
            })
            .await
            .unwrap();
    }

    pub async fn next_end_reason(events: &mut broadcast::Receiver<AgentEvent>) -> EndReason {
        loop {
            if let AgentEvent::Ended { reason, .. } = events.recv().await.unwrap() {
                return reason;
            }
        }
    }

    /// The next spoken text and whether it was the fallback.
    pub async fn next_response(events: &mut broadcast::Receiver<AgentEvent>) -> (String, bool) {
        loop {
            if let AgentEvent::ResponseReady { text, fallback, .. } = events.recv().await.unwrap()
            {
                return (text, fallback);
            }
        }
    }

    pub async fn next_state(events: &mut broadcast::Receiver<AgentEvent>, wanted: SessionState) {
        loop {
            match events.recv().await.unwrap() {
                AgentEvent::StateChanged { state, .. } if state == wanted => return,
                _ => {}
            }
        }
    }
}
