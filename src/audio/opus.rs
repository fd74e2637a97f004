//! Opus frame decoding.

use crate::error::{AgentError, Result};
use tracing::warn;

/// Sample rates the Opus decoder can be created at (RFC 6716).
pub const OPUS_SAMPLE_RATES: [u32; 5] = [8_000, 12_000, 16_000, 24_000, 48_000];

/// Maximum Opus frame duration in milliseconds.
const MAX_FRAME_MS: usize = 120;

/// Stateful Opus decoder bound to a target sample rate and channel count.
pub struct OpusDecoder {
    inner: opus::Decoder,
    sample_rate: u32,
    channels: u16,
}

impl OpusDecoder {
    /// Create a decoder producing interleaved i16 samples at the given
    /// rate and channel count.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate is not an Opus rate, or the
    /// channel count is not 1 or 2.
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        if !OPUS_SAMPLE_RATES.contains(&sample_rate) {
            return Err(AgentError::InvalidFormat(format!(
                "opus decoder sample rate must be one of {OPUS_SAMPLE_RATES:?}, got {sample_rate}"
            )));
        }
        let opus_channels = match channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            other => {
                return Err(AgentError::InvalidFormat(format!(
                    "opus decoder supports 1 or 2 channels, got {other}"
                )));
            }
        };
        let inner = opus::Decoder::new(sample_rate, opus_channels)
            .map_err(|e| AgentError::Audio(format!("failed to create opus decoder: {e}")))?;
        Ok(Self {
            inner,
            sample_rate,
            channels,
        })
    }

    /// The sample rate this decoder produces.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The channel count this decoder produces.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode a single Opus frame to interleaved i16 samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid Opus data.
    pub fn decode_frame(&mut self, frame: &[u8]) -> Result<Vec<i16>> {
        let max_samples =
            self.sample_rate as usize * MAX_FRAME_MS / 1000 * usize::from(self.channels);
        let mut output = vec![0i16; max_samples];
        let decoded = self
            .inner
            .decode(frame, &mut output, false)
            .map_err(|e| AgentError::Audio(format!("opus decode failed: {e}")))?;
        output.truncate(decoded * usize::from(self.channels));
        Ok(output)
    }

    /// Decode a batch of frames, tolerating individually corrupt frames.
    ///
    /// # Errors
    ///
    /// Fails only when every frame in a non-empty batch failed to decode.
    pub fn decode_frames(&mut self, frames: &[Vec<u8>]) -> Result<Vec<i16>> {
        let mut samples = Vec::new();
        let mut decoded_frames = 0usize;
        for (index, frame) in frames.iter().enumerate() {
            match self.decode_frame(frame) {
                Ok(frame_samples) => {
                    decoded_frames += 1;
                    samples.extend_from_slice(&frame_samples);
                }
                Err(e) => warn!("skipping undecodable opus frame {index}: {e}"),
            }
        }
        if decoded_frames == 0 && !frames.is_empty() {
            return Err(AgentError::Audio(
                "no opus frames could be decoded from input".to_owned(),
            ));
        }
        Ok(samples)
    }
}

impl std::fmt::Debug for OpusDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusDecoder")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_opus_sample_rate() {
        let err = OpusDecoder::new(44_100, 1).unwrap_err();
        assert!(matches!(err, AgentError::InvalidFormat(_)));
    }

    #[test]
    fn rejects_bad_channel_count() {
        let err = OpusDecoder::new(48_000, 3).unwrap_err();
        assert!(matches!(err, AgentError::InvalidFormat(_)));
    }

    #[test]
    fn empty_batch_decodes_to_empty() {
        let mut decoder = OpusDecoder::new(16_000, 1).expect("decoder");
        assert!(decoder.decode_frames(&[]).expect("decode").is_empty());
    }

    #[test]
    fn batch_of_garbage_frames_fails() {
        let mut decoder = OpusDecoder::new(16_000, 1).expect("decoder");
        // Code-3 packet announcing 63 VBR frames with no room for their
        // length bytes: guaranteed OPUS_INVALID_PACKET.
        let garbage = vec![vec![0xFF, 0xFF, 0xFF]];
        assert!(decoder.decode_frames(&garbage).is_err());
    }
}
