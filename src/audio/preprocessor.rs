//! Input audio normalization.
//!
//! Converts arbitrary caller audio (raw PCM in several encodings, WAV or
//! WebM containers, raw Opus frames) into the single PCM format the STT
//! provider consumes: decode → stereo downmix → resample → encode.

use crate::audio::codec;
use crate::audio::opus::{OPUS_SAMPLE_RATES, OpusDecoder};
use crate::audio::{AudioEncoding, AudioFormat, AudioInput, NormalizedAudioFormat};
use crate::audio::{wav, webm};
use crate::error::{AgentError, Result};
use bytes::Bytes;
use tracing::debug;

/// Decoded-but-unnormalized PCM: samples plus their actual rate/layout.
struct RawPcm {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

/// Normalizes input chunks to the target PCM format.
///
/// The preprocessor is a value; the embedded Opus decoder (created lazily
/// for compressed input) is released on drop.
pub struct AudioPreprocessor {
    source: NormalizedAudioFormat,
    target: NormalizedAudioFormat,
    opus: Option<OpusDecoder>,
}

impl AudioPreprocessor {
    /// Build a preprocessor converting `source` into `target`.
    ///
    /// Missing source sample rate or channels are assumed to match the
    /// target (logged at debug). The target encoding must be `linear16`
    /// or `float32`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidFormat`] for an unsupported target
    /// encoding or an input encoding the preprocessor cannot decode.
    pub fn new(source: AudioFormat, target: AudioFormat) -> Result<Self> {
        let target = target.normalized();
        if !matches!(
            target.encoding,
            AudioEncoding::Linear16 | AudioEncoding::Float32
        ) {
            return Err(AgentError::InvalidFormat(format!(
                "unsupported target encoding {}: the preprocessor can only produce linear16 or float32",
                target.encoding
            )));
        }
        if !source.encoding.is_decodable() {
            return Err(AgentError::InvalidFormat(format!(
                "no decoder for input encoding {}; supported compressed inputs are wav, webm, and raw opus",
                source.encoding
            )));
        }

        if source.sample_rate.is_none() {
            debug!(
                "input sample rate not declared; assuming target rate {}",
                target.sample_rate
            );
        }
        if source.channels.is_none() {
            debug!(
                "input channel count not declared; assuming target channels {}",
                target.channels
            );
        }
        let source = NormalizedAudioFormat {
            encoding: source.encoding,
            sample_rate: source.sample_rate.unwrap_or(target.sample_rate),
            channels: source.channels.unwrap_or(target.channels),
        };

        Ok(Self {
            source,
            target,
            opus: None,
        })
    }

    /// The resolved source format.
    pub fn source_format(&self) -> NormalizedAudioFormat {
        self.source
    }

    /// The resolved target format.
    pub fn target_format(&self) -> NormalizedAudioFormat {
        self.target
    }

    /// Normalize one input chunk to bytes in the target format.
    ///
    /// # Errors
    ///
    /// Returns an error when the chunk cannot be decoded under the
    /// declared input encoding.
    pub fn process(&mut self, input: AudioInput) -> Result<Bytes> {
        let raw = self.decode(input)?;

        let samples = if raw.channels == 2 && self.target.channels == 1 {
            codec::stereo_to_mono(&raw.samples)
        } else {
            raw.samples
        };

        let samples = if raw.sample_rate != self.target.sample_rate {
            codec::resample(&samples, raw.sample_rate, self.target.sample_rate)?
        } else {
            samples
        };

        let bytes = match self.target.encoding {
            AudioEncoding::Linear16 => codec::samples_to_linear16(&samples),
            AudioEncoding::Float32 => codec::samples_to_float32_bytes(&samples),
            // Rejected in new().
            other => {
                return Err(AgentError::InvalidFormat(format!(
                    "unsupported target encoding {other}"
                )));
            }
        };
        Ok(Bytes::from(bytes))
    }

    fn decode(&mut self, input: AudioInput) -> Result<RawPcm> {
        match input {
            AudioInput::Int16(samples) => Ok(self.pcm_at_source_rate(samples)),
            AudioInput::Float32(samples) => Ok(self.pcm_at_source_rate(
                samples.iter().map(|&s| codec::f32_to_i16(s)).collect(),
            )),
            AudioInput::Uint8(bytes) => {
                Ok(self.pcm_at_source_rate(codec::uint8_to_samples(&bytes)))
            }
            AudioInput::Bytes(bytes) => self.decode_bytes(&bytes),
        }
    }

    fn decode_bytes(&mut self, bytes: &[u8]) -> Result<RawPcm> {
        match self.source.encoding {
            AudioEncoding::Linear16 => {
                Ok(self.pcm_at_source_rate(codec::linear16_to_samples(bytes)))
            }
            AudioEncoding::Linear32 => {
                Ok(self.pcm_at_source_rate(codec::linear32_to_samples(bytes)))
            }
            AudioEncoding::Float32 => {
                Ok(self.pcm_at_source_rate(codec::float32_bytes_to_samples(bytes)))
            }
            AudioEncoding::Mulaw => Ok(self.pcm_at_source_rate(codec::mulaw_decode(bytes))),
            AudioEncoding::Alaw => Ok(self.pcm_at_source_rate(codec::alaw_decode(bytes))),
            AudioEncoding::Wav => {
                let decoded = wav::decode_wav(bytes)?;
                Ok(RawPcm {
                    samples: decoded.samples,
                    sample_rate: decoded.sample_rate,
                    channels: decoded.channels,
                })
            }
            AudioEncoding::Webm => {
                let frames = webm::extract_frames(bytes);
                self.decode_opus_frames(&frames)
            }
            AudioEncoding::Opus => {
                let frames = vec![bytes.to_vec()];
                self.decode_opus_frames(&frames)
            }
            other => Err(AgentError::InvalidFormat(format!(
                "no decoder for input encoding {other}"
            ))),
        }
    }

    fn decode_opus_frames(&mut self, frames: &[Vec<u8>]) -> Result<RawPcm> {
        if self.opus.is_none() {
            // Decode straight to the target rate when it is an Opus rate;
            // otherwise decode at 48 kHz and resample below.
            let rate = if OPUS_SAMPLE_RATES.contains(&self.target.sample_rate) {
                self.target.sample_rate
            } else {
                48_000
            };
            self.opus = Some(OpusDecoder::new(rate, self.target.channels)?);
        }
        let decoder = self
            .opus
            .as_mut()
            .ok_or_else(|| AgentError::Pipeline("opus decoder missing after init".to_owned()))?;
        let samples = decoder.decode_frames(frames)?;
        Ok(RawPcm {
            samples,
            sample_rate: decoder.sample_rate(),
            channels: decoder.channels(),
        })
    }

    fn pcm_at_source_rate(&self, samples: Vec<i16>) -> RawPcm {
        RawPcm {
            samples,
            sample_rate: self.source.sample_rate,
            channels: self.source.channels,
        }
    }
}

impl std::fmt::Debug for AudioPreprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPreprocessor")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
