//! PCM16 audio frames and the conversions the pipeline needs between the
//! transport, the speech services and the synthesizer.

use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::time::Duration;

/// Sample rate used for channels when the creator does not pick one.
pub const DEFAULT_CHANNEL_SAMPLE_RATE: u32 = 16_000;
/// OpenAI's `pcm` speech output is 24kHz mono PCM16.
pub const OPENAI_SPEECH_SAMPLE_RATE: u32 = 24_000;
/// Frame length used when chunking synthesized speech for the channel.
pub const FRAME_DURATION_MS: u32 = 20;

const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// A block of mono PCM16 audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Builds a frame from little-endian PCM16 bytes. A trailing odd byte is dropped.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        Self::new(pcm16_from_le_bytes(bytes), sample_rate)
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        pcm16_to_le_bytes(&self.samples)
    }

    pub fn duration(&self) -> Duration {
        samples_duration(self.samples.len(), self.sample_rate)
    }

    /// Root-mean-square amplitude on the i16 scale.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Speech produced by a synthesizer, at the synthesizer's native rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

pub fn samples_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(samples as u64 * 1_000_000_000 / sample_rate as u64)
}

pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

pub fn decode_i16(base64_fragment: &str) -> Vec<i16> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(bytes) => pcm16_from_le_bytes(&bytes),
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode base64 fragment to i16");
            Vec::new()
        }
    }
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Resamples mono PCM16 from one rate to another.
pub fn resample(samples: &[i16], from: u32, to: u32) -> anyhow::Result<Vec<i16>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let input = convert_i16_to_f32(samples);
    let mut resampler = create_resampler(from as f64, to as f64, RESAMPLER_CHUNK_SIZE)?;
    let expected = (samples.len() as u64 * to as u64 / from as u64) as usize;
    let mut output = Vec::with_capacity(expected + RESAMPLER_CHUNK_SIZE);
    for block in input.chunks(RESAMPLER_CHUNK_SIZE) {
        let processed = if block.len() == RESAMPLER_CHUNK_SIZE {
            resampler.process(&[block][..], None)?
        } else {
            resampler.process_partial(Some(&[block][..]), None)?
        };
        output.extend_from_slice(&processed[0]);
    }
    Ok(convert_f32_to_i16(&output))
}

/// Splits PCM16 into consecutive frames of `frame_ms`; the last frame may be shorter.
pub fn split_frames(samples: &[i16], sample_rate: u32, frame_ms: u32) -> Vec<AudioFrame> {
    let frame_len = ((sample_rate as u64 * frame_ms as u64) / 1000).max(1) as usize;
    samples
        .chunks(frame_len)
        .map(|chunk| AudioFrame::new(chunk.to_vec(), sample_rate))
        .collect()
}

/// Wraps mono PCM16 in a minimal RIFF/WAVE container for upload to transcription APIs.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(&pcm16_to_le_bytes(samples));
    wav
}
