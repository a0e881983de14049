//! The per-session turn state machine.
//!
//! `Idle → Listening → Processing → Responding → Listening`, or `Ended`.
//!
//! One pipeline runs as one task, so turns within a session are strictly
//! serialized. Every suspension point also waits on the session's
//! cancellation token, which makes a stop take effect at the next await.
//! Configuration updates are queued on the session's shared state and only
//! read while listening, so a turn always runs against a single snapshot.
//!
//! The greeting is played right after the session first enters `Listening`.
//! It is not a turn, and audio captured while it plays is discarded.

use crate::{
    audio::{FRAME_DURATION_MS, resample, split_frames},
    config::{AgentConfig, AgentConfigPatch, TimeoutAction},
    context::Turn,
    error::{AgentError, ServiceError},
    events::{AgentEvent, EndReason, EventBus},
    media::MediaStreams,
    registry::{PipelineEndpoints, SessionShared},
    services::{GenerationRequest, Services},
    session::{SessionId, SessionState, SessionStatus},
    vad::{EnergyVad, Utterance, VadConfig},
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub(crate) struct PipelineSettings {
    pub vad: VadConfig,
    /// Sleep for each frame's duration while speaking, as a live speaker would.
    pub pace_playback: bool,
}

enum TurnOutcome {
    /// Nothing was said; keep listening without counting a turn.
    Skipped,
    /// The turn finished, successfully or via the fallback.
    Counted,
    End(EndReason),
}

enum SpeakError {
    Interrupted(EndReason),
    Service(ServiceError),
}

pub(crate) struct TurnPipeline {
    session_id: SessionId,
    services: Services,
    media: MediaStreams,
    status: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
    shared: Arc<SessionShared>,
    events: EventBus,
    vad: EnergyVad,
    pace_playback: bool,
}

impl TurnPipeline {
    pub(crate) fn new(
        session_id: SessionId,
        services: Services,
        media: MediaStreams,
        endpoints: PipelineEndpoints,
        events: EventBus,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            session_id,
            services,
            media,
            status: endpoints.status,
            cancel: endpoints.cancel,
            shared: endpoints.shared,
            events,
            vad: EnergyVad::new(settings.vad),
            pace_playback: settings.pace_playback,
        }
    }

    /// Runs until the session ends and reports why.
    pub(crate) async fn run(mut self) -> EndReason {
        let reason = self.drive().await;
        if reason == EndReason::TransportLost {
            let message = AgentError::NetworkError("channel connection lost".to_string()).to_string();
            self.status.send_modify(|s| s.last_error = Some(message));
        }
        self.set_state(SessionState::Ended);
        reason
    }

    async fn drive(&mut self) -> EndReason {
        self.set_state(SessionState::Listening);
        let config = self.shared.config();
        if !config.greeting.is_empty() {
            match self.speak(&config, &config.greeting, false).await {
                Ok(()) => {}
                Err(SpeakError::Interrupted(reason)) => return reason,
                Err(SpeakError::Service(e)) => {
                    warn!(error = %e, "Greeting could not be spoken");
                    self.status
                        .send_modify(|s| s.last_error = Some(AgentError::from(e).to_string()));
                }
            }
        }

        loop {
            self.apply_pending_update();
            self.set_state(SessionState::Listening);

            let utterance = match self.listen().await {
                Ok(utterance) => utterance,
                Err(reason) => return reason,
            };

            let config = self.shared.config();
            match self.run_turn(&config, utterance).await {
                TurnOutcome::Skipped => {}
                TurnOutcome::Counted => {
                    let turns = self.status.borrow().turn_count;
                    if config.max_turns.is_some_and(|max| turns >= max) {
                        info!(turns, "Turn limit reached");
                        return EndReason::TurnLimitReached;
                    }
                }
                TurnOutcome::End(reason) => return reason,
            }
        }
    }

    /// Waits for the VAD to close an utterance, applying queued updates meanwhile.
    async fn listen(&mut self) -> Result<Utterance, EndReason> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(EndReason::Stopped),
                _ = self.shared.update_queued() => self.apply_pending_update(),
                frame = self.media.inbound.recv() => match frame {
                    Some(frame) => {
                        if let Some(utterance) = self.vad.push(&frame) {
                            debug!(duration_ms = utterance.duration().as_millis() as u64, "Utterance detected");
                            return Ok(utterance);
                        }
                    }
                    None => return Err(EndReason::TransportLost),
                },
            }
        }
    }

    async fn run_turn(&mut self, config: &AgentConfig, utterance: Utterance) -> TurnOutcome {
        self.set_state(SessionState::Processing);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return TurnOutcome::End(EndReason::Stopped),
            result = tokio::time::timeout(config.response_timeout(), self.process(config, &utterance)) => result,
        };

        match result {
            Ok(Ok(Some(turn))) => match self.respond(config, &turn.response, false).await {
                Ok(()) => {
                    self.shared.with_context(|context| context.push(turn));
                    self.status.send_modify(|s| {
                        s.turn_count += 1;
                        s.consecutive_failures = 0;
                    });
                    TurnOutcome::Counted
                }
                Err(SpeakError::Interrupted(reason)) => TurnOutcome::End(reason),
                Err(SpeakError::Service(e)) => self.fail(config, e).await,
            },
            Ok(Ok(None)) => {
                debug!("Empty transcript, treating utterance as noise");
                TurnOutcome::Skipped
            }
            Ok(Err(e)) => self.fail(config, e).await,
            Err(_) => {
                warn!(timeout_ms = config.response_timeout_ms, "Turn timed out while processing");
                self.fail(config, ServiceError::Timeout).await
            }
        }
    }

    /// Transcription then generation. `None` when the utterance had no words.
    async fn process(
        &self,
        config: &AgentConfig,
        utterance: &Utterance,
    ) -> Result<Option<Turn>, ServiceError> {
        let transcript = self.services.stt.transcribe(utterance).await?;
        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            return Ok(None);
        }
        info!(%transcript, "Transcript received");
        self.events.publish(AgentEvent::TranscriptReceived {
            session_id: self.session_id.clone(),
            text: transcript.clone(),
        });

        let request = GenerationRequest {
            persona_prompt: config.persona_prompt.clone(),
            history: self.shared.history(),
            transcript: transcript.clone(),
        };
        let response = self.services.generator.generate(request).await?;
        Ok(Some(Turn {
            transcript,
            response,
        }))
    }

    /// Records a failed turn and speaks the fallback in place of the response.
    async fn fail(&mut self, config: &AgentConfig, error: ServiceError) -> TurnOutcome {
        let timed_out = error == ServiceError::Timeout;
        let message = if timed_out {
            AgentError::Timeout(config.response_timeout()).to_string()
        } else {
            AgentError::from(error).to_string()
        };
        warn!(error = %message, "Turn failed, delivering fallback");

        self.status.send_modify(|s| {
            s.last_error = Some(message.clone());
            s.consecutive_failures += 1;
        });
        self.events.publish(AgentEvent::TurnFailed {
            session_id: self.session_id.clone(),
            error: message.clone(),
        });

        match self.respond(config, &config.fallback_text, true).await {
            Ok(()) => {}
            Err(SpeakError::Interrupted(reason)) => return TurnOutcome::End(reason),
            Err(SpeakError::Service(e)) => warn!(error = %e, "Fallback could not be spoken"),
        }
        self.status.send_modify(|s| s.turn_count += 1);

        let failures = self.status.borrow().consecutive_failures;
        if failures >= config.max_consecutive_failures {
            warn!(failures, "Consecutive failure limit reached");
            return TurnOutcome::End(EndReason::TooManyFailures(message));
        }
        if timed_out && config.on_timeout == TimeoutAction::EndSession {
            return TurnOutcome::End(EndReason::TimedOut);
        }
        TurnOutcome::Counted
    }

    async fn respond(
        &mut self,
        config: &AgentConfig,
        text: &str,
        fallback: bool,
    ) -> Result<(), SpeakError> {
        self.set_state(SessionState::Responding);
        self.speak(config, text, fallback).await
    }

    /// Synthesizes `text` and plays it into the channel in generation order.
    async fn speak(
        &mut self,
        config: &AgentConfig,
        text: &str,
        fallback: bool,
    ) -> Result<(), SpeakError> {
        self.events.publish(AgentEvent::ResponseReady {
            session_id: self.session_id.clone(),
            text: text.to_string(),
            fallback,
        });
        if text.is_empty() {
            return Ok(());
        }

        let synthesis = tokio::time::timeout(
            config.response_timeout(),
            self.services.synthesizer.synthesize(text),
        );
        let speech = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SpeakError::Interrupted(EndReason::Stopped)),
            result = synthesis => match result {
                Ok(Ok(speech)) => speech,
                Ok(Err(e)) => return Err(SpeakError::Service(e)),
                Err(_) => return Err(SpeakError::Service(ServiceError::Timeout)),
            },
        };

        let samples = resample(&speech.samples, speech.sample_rate, self.media.sample_rate)
            .map_err(|e| SpeakError::Service(ServiceError::Failed(e.to_string())))?;
        let frames = split_frames(&samples, self.media.sample_rate, FRAME_DURATION_MS);
        debug!(frames = frames.len(), fallback, "Playing response");

        for frame in frames {
            let length = frame.duration();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SpeakError::Interrupted(EndReason::Stopped)),
                sent = self.media.outbound.send(frame) => {
                    if sent.is_err() {
                        return Err(SpeakError::Interrupted(EndReason::TransportLost));
                    }
                }
            }
            if self.pace_playback {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SpeakError::Interrupted(EndReason::Stopped)),
                    _ = tokio::time::sleep(length) => {}
                }
            }
        }

        self.discard_captured_audio();
        Ok(())
    }

    /// Drops audio that arrived while the agent was busy; there is no barge-in.
    fn discard_captured_audio(&mut self) {
        let mut dropped = 0usize;
        while self.media.inbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded audio captured while responding");
        }
        self.vad.reset();
    }

    fn apply_pending_update(&mut self) {
        if let Some(patch) = self.shared.take_update() {
            self.apply_update(patch);
        }
    }

    fn apply_update(&mut self, patch: AgentConfigPatch) {
        let next = self.shared.config().merged(&patch);
        if let Err(e) = next.validate() {
            warn!(error = %e, "Ignoring invalid configuration update");
            return;
        }
        let depth = next.history_depth;
        self.shared.with_context(|context| {
            if patch.reset_history {
                context.clear();
            }
            context.set_depth(depth);
        });
        self.shared.replace_config(next);

        let mut revision = 0;
        self.status.send_modify(|s| {
            s.config_revision += 1;
            revision = s.config_revision;
        });
        info!(revision, reset_history = patch.reset_history, "Configuration applied");
        self.events.publish(AgentEvent::ConfigApplied {
            session_id: self.session_id.clone(),
            revision,
        });
    }

    fn set_state(&self, state: SessionState) {
        let changed = self.status.send_if_modified(|s| {
            if s.state == state || s.state == SessionState::Ended {
                return false;
            }
            s.state = state;
            true
        });
        if changed {
            debug!(%state, "State changed");
            self.events.publish(AgentEvent::StateChanged {
                session_id: self.session_id.clone(),
                state,
            });
        }
    }
}
