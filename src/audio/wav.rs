//! WAV (RIFF/WAVE) container decoding.

use crate::audio::codec::f32_to_i16;
use crate::error::{AgentError, Result};
use std::io::Cursor;

/// PCM audio decoded out of a WAV container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWav {
    /// Interleaved 16-bit samples.
    pub samples: Vec<i16>,
    /// Sample rate from the `fmt ` chunk.
    pub sample_rate: u32,
    /// Channel count from the `fmt ` chunk.
    pub channels: u16,
}

/// Decode a WAV byte buffer to 16-bit PCM.
///
/// Supports 8-bit unsigned, 16-bit signed, and 32-bit float sample
/// formats. 8-bit samples are widened to 16 bits; floats are clamped and
/// scaled.
///
/// # Errors
///
/// Returns [`AgentError::InvalidFormat`] when the RIFF/WAVE header or data
/// chunk is missing, or the bit depth is unsupported.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedWav> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| AgentError::InvalidFormat(format!("not a decodable WAV container: {e}")))?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 8) => collect_int_samples(reader, 8)?,
        (hound::SampleFormat::Int, 16) => collect_int_samples(reader, 16)?,
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .map(|s| s.map(f32_to_i16))
            .collect::<std::result::Result<Vec<i16>, _>>()
            .map_err(|e| AgentError::InvalidFormat(format!("bad WAV float data: {e}")))?,
        (format, bits) => {
            return Err(AgentError::InvalidFormat(format!(
                "unsupported WAV sample format: {bits}-bit {format:?}"
            )));
        }
    };

    Ok(DecodedWav {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn collect_int_samples(
    reader: hound::WavReader<Cursor<&[u8]>>,
    bits: u16,
) -> Result<Vec<i16>> {
    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()
        .map_err(|e| AgentError::InvalidFormat(format!("bad WAV sample data: {e}")))?;
    // hound exposes 8-bit audio as centered i8 values; widen to 16-bit.
    if bits == 8 {
        Ok(samples.into_iter().map(|s| s << 8).collect())
    } else {
        Ok(samples)
    }
}
