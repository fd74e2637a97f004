//! Audio formats, input chunks, and the normalization pipeline.

pub mod codec;
pub mod opus;
pub mod preprocessor;
pub mod wav;
pub mod webm;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Audio encodings understood at the API boundary.
///
/// Raw PCM encodings are decoded directly; `wav`, `webm`, and `opus` route
/// through the container/codec decoders; the remaining compressed
/// encodings are declared for format negotiation but are not decodable by
/// the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioEncoding {
    /// Signed 16-bit little-endian PCM.
    Linear16,
    /// Signed 32-bit little-endian PCM.
    Linear32,
    /// IEEE-754 32-bit little-endian float PCM.
    Float32,
    /// G.711 μ-law, 8-bit companded.
    Mulaw,
    /// G.711 A-law, 8-bit companded.
    Alaw,
    /// Raw Opus frames (RFC 6716).
    Opus,
    /// Opus in an Ogg container.
    OggOpus,
    Flac,
    Mp3,
    Aac,
    Speex,
    AmrNb,
    AmrWb,
    G729,
    /// RIFF/WAVE container.
    Wav,
    /// WebM (EBML) container carrying Opus.
    Webm,
    Ogg,
    Mp4,
}

impl AudioEncoding {
    /// Default sample rate applied when a format omits one.
    pub fn default_sample_rate(self) -> u32 {
        match self {
            Self::Linear16 | Self::Linear32 | Self::Float32 | Self::Wav | Self::AmrWb => 16_000,
            Self::Mulaw | Self::Alaw | Self::Speex | Self::AmrNb | Self::G729 => 8_000,
            Self::Opus | Self::OggOpus | Self::Webm | Self::Ogg => 48_000,
            Self::Flac | Self::Mp3 | Self::Aac | Self::Mp4 => 44_100,
        }
    }

    /// Default channel count applied when a format omits one.
    pub fn default_channels(self) -> u16 {
        1
    }

    /// Raw PCM encodings are interpreted directly from bytes.
    pub fn is_raw_pcm(self) -> bool {
        matches!(
            self,
            Self::Linear16 | Self::Linear32 | Self::Float32 | Self::Mulaw | Self::Alaw
        )
    }

    /// Whether the preprocessor has a decoder for this encoding.
    pub fn is_decodable(self) -> bool {
        self.is_raw_pcm() || matches!(self, Self::Wav | Self::Webm | Self::Opus)
    }
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Linear16 => "linear16",
            Self::Linear32 => "linear32",
            Self::Float32 => "float32",
            Self::Mulaw => "mulaw",
            Self::Alaw => "alaw",
            Self::Opus => "opus",
            Self::OggOpus => "ogg-opus",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Speex => "speex",
            Self::AmrNb => "amr-nb",
            Self::AmrWb => "amr-wb",
            Self::G729 => "g729",
            Self::Wav => "wav",
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Mp4 => "mp4",
        };
        f.write_str(name)
    }
}

/// An audio format as declared at the API boundary.
///
/// Missing sample rate or channel count fall back to the per-encoding
/// defaults when normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
}

impl AudioFormat {
    /// A format with only the encoding set.
    pub fn new(encoding: AudioEncoding) -> Self {
        Self {
            encoding,
            sample_rate: None,
            channels: None,
        }
    }

    /// A fully specified format.
    pub fn with_rate(encoding: AudioEncoding, sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }

    /// Resolve omitted fields from the per-encoding default table.
    pub fn normalized(self) -> NormalizedAudioFormat {
        NormalizedAudioFormat {
            encoding: self.encoding,
            sample_rate: self
                .sample_rate
                .unwrap_or_else(|| self.encoding.default_sample_rate()),
            channels: self
                .channels
                .unwrap_or_else(|| self.encoding.default_channels()),
        }
    }
}

impl From<AudioEncoding> for AudioFormat {
    fn from(encoding: AudioEncoding) -> Self {
        Self::new(encoding)
    }
}

/// An [`AudioFormat`] with every field resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub channels: u16,
}

impl std::fmt::Display for NormalizedAudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}Hz/{}ch",
            self.encoding, self.sample_rate, self.channels
        )
    }
}

/// One chunk of caller-supplied audio.
///
/// Container data (`wav`, `webm`, raw `opus`) must arrive as fully
/// materialized [`AudioInput::Bytes`]; there is deliberately no variant
/// for a lazily produced blob.
#[derive(Debug, Clone)]
pub enum AudioInput {
    /// Encoded bytes, interpreted per the configured input encoding.
    Bytes(Bytes),
    /// Signed 16-bit samples at the configured input rate/channels.
    Int16(Vec<i16>),
    /// 32-bit float samples at the configured input rate/channels.
    Float32(Vec<f32>),
    /// Unsigned 8-bit (offset binary) samples.
    Uint8(Vec<u8>),
}

impl AudioInput {
    /// Whether this chunk carries no audio at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(b) => b.is_empty(),
            Self::Int16(s) => s.is_empty(),
            Self::Float32(s) => s.is_empty(),
            Self::Uint8(s) => s.is_empty(),
        }
    }
}

impl From<Bytes> for AudioInput {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for AudioInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<Vec<i16>> for AudioInput {
    fn from(samples: Vec<i16>) -> Self {
        Self::Int16(samples)
    }
}

impl From<Vec<f32>> for AudioInput {
    fn from(samples: Vec<f32>) -> Self {
        Self::Float32(samples)
    }
}
