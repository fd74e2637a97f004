//! Error types for the voice agent pipeline.

/// Provider subsystems that can report errors while the agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorSource {
    /// Speech-to-text provider.
    Stt,
    /// Language model provider.
    Llm,
    /// Text-to-speech provider.
    Tts,
    /// Voice activity detection provider.
    Vad,
    /// Turn detection provider.
    TurnDetector,
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stt => "stt",
            Self::Llm => "llm",
            Self::Tts => "tts",
            Self::Vad => "vad",
            Self::TurnDetector => "turn-detector",
        };
        f.write_str(name)
    }
}

/// Top-level error type for the voice agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Audio decoding or format conversion error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Input audio declares a format the preprocessor cannot decode, or the
    /// configured target encoding is not `linear16`/`float32`.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Speech-to-text provider error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Language model provider error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech provider error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Voice activity detection provider error.
    #[error("VAD error: {0}")]
    Vad(String),

    /// Turn detection provider error.
    #[error("turn detector error: {0}")]
    TurnDetector(String),

    /// A provider call exceeded its configured deadline.
    #[error("{source} timed out after {waited_ms}ms")]
    Timeout {
        /// Which provider timed out.
        source: ErrorSource,
        /// How long the actor waited before giving up.
        waited_ms: u64,
    },

    /// Invalid agent configuration, rejected synchronously at the call site.
    #[error("config error: {0}")]
    Config(String),

    /// Pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// The provider subsystem this error is attributed to, if any.
    pub fn source_kind(&self) -> Option<ErrorSource> {
        match self {
            Self::Stt(_) => Some(ErrorSource::Stt),
            Self::Llm(_) => Some(ErrorSource::Llm),
            Self::Tts(_) => Some(ErrorSource::Tts),
            Self::Vad(_) => Some(ErrorSource::Vad),
            Self::TurnDetector(_) => Some(ErrorSource::TurnDetector),
            Self::Timeout { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// Build a provider error for the given source.
    pub fn for_source(source: ErrorSource, message: impl Into<String>) -> Self {
        let message = message.into();
        match source {
            ErrorSource::Stt => Self::Stt(message),
            ErrorSource::Llm => Self::Llm(message),
            ErrorSource::Tts => Self::Tts(message),
            ErrorSource::Vad => Self::Vad(message),
            ErrorSource::TurnDetector => Self::TurnDetector(message),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AgentError>;
