//! Energy-based utterance segmentation.
//!
//! Frames are classified as speech when their RMS amplitude exceeds a
//! threshold. An utterance starts at the first speech frame and closes after a
//! run of trailing silence, or when it reaches the maximum length. Utterances
//! with too little voiced audio are dropped as noise. Timing is derived from
//! sample counts, so segmentation is independent of wall-clock jitter.

use crate::audio::{AudioFrame, samples_duration};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct VadConfig {
    /// RMS amplitude (i16 scale) above which a frame counts as speech.
    pub threshold: f32,
    /// Voiced audio required before an utterance is emitted.
    pub min_speech: Duration,
    /// Trailing silence that closes an utterance.
    pub trailing_silence: Duration,
    /// Utterances are force-closed at this length.
    pub max_utterance: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 500.0,
            min_speech: Duration::from_millis(100),
            trailing_silence: Duration::from_millis(400),
            max_utterance: Duration::from_secs(15),
        }
    }
}

/// A complete, contiguous piece of speech ready for transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        samples_duration(self.samples.len(), self.sample_rate)
    }
}

#[derive(Debug, Default)]
struct Segment {
    samples: Vec<i16>,
    sample_rate: u32,
    voiced: Duration,
    silence: Duration,
}

/// Incremental segmenter fed one frame at a time.
#[derive(Debug)]
pub struct EnergyVad {
    config: VadConfig,
    current: Option<Segment>,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    /// Discards any partially collected utterance.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Feeds a frame; returns an utterance when this frame closes one.
    pub fn push(&mut self, frame: &AudioFrame) -> Option<Utterance> {
        let voiced = frame.rms() >= self.config.threshold;
        let length = frame.duration();

        if self.current.is_none() {
            if !voiced {
                return None;
            }
            self.current = Some(Segment {
                sample_rate: frame.sample_rate,
                ..Default::default()
            });
        }
        let segment = self.current.as_mut()?;
        if segment.sample_rate != frame.sample_rate {
            tracing::warn!(
                expected = segment.sample_rate,
                got = frame.sample_rate,
                "Sample rate changed mid-utterance, discarding segment"
            );
            self.current = None;
            return None;
        }

        segment.samples.extend_from_slice(&frame.samples);
        if voiced {
            segment.voiced += length;
            segment.silence = Duration::ZERO;
        } else {
            segment.silence += length;
        }

        let total = samples_duration(segment.samples.len(), segment.sample_rate);
        let closed = segment.silence >= self.config.trailing_silence
            || total >= self.config.max_utterance;
        if !closed {
            return None;
        }

        let segment = self.current.take()?;
        if segment.voiced < self.config.min_speech {
            tracing::debug!(voiced_ms = segment.voiced.as_millis() as u64, "Dropping short noise burst");
            return None;
        }
        Some(Utterance {
            samples: segment.samples,
            sample_rate: segment.sample_rate,
        })
    }
}
