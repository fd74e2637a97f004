//! Public events emitted by the agent.
//!
//! Events are delivered synchronously, in a total order with hard
//! guarantees: `agent:started` is always first, `agent:stopped` always
//! last, and every `ai-turn:started` is closed by exactly one
//! `ai-turn:ended` or `ai-turn:interrupted`.

use crate::error::ErrorSource;
use crate::metrics::{AiTurnMetrics, HumanTurnMetrics, now_ms};
use bytes::Bytes;
use std::sync::Arc;

/// A public event plus the wall-clock time it was emitted.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub kind: AgentEventKind,
}

impl AgentEvent {
    pub(crate) fn now(kind: AgentEventKind) -> Self {
        Self {
            timestamp_ms: now_ms(),
            kind,
        }
    }
}

/// Everything the agent reports to its consumer.
#[derive(Debug, Clone)]
pub enum AgentEventKind {
    /// The session entered `running`. Always the first event.
    AgentStarted,
    /// The session stopped. Always the last event.
    AgentStopped,
    /// A provider reported (or timed out into) an error.
    AgentError {
        source: ErrorSource,
        message: String,
    },

    /// The user started speaking (or produced a first transcript).
    HumanTurnStarted,
    /// A partial or final STT hypothesis.
    HumanTurnTranscript { text: String, is_final: bool },
    /// The human turn ended; an AI turn will follow.
    HumanTurnEnded {
        transcript: String,
        metrics: HumanTurnMetrics,
    },
    /// The turn detector discarded the human turn.
    HumanTurnAbandoned { reason: String },

    /// The agent began generating a response.
    AiTurnStarted,
    /// One streamed LLM token.
    AiTurnToken { token: String },
    /// One sentence handed to TTS.
    AiTurnSentence { sentence: String, index: usize },
    /// One chunk of synthesized audio, as forwarded to the audio stream.
    AiTurnAudio { bytes: Bytes },
    /// The AI turn ran to completion.
    AiTurnEnded {
        text: String,
        /// False when the response produced no audio.
        was_spoken: bool,
        metrics: AiTurnMetrics,
    },
    /// The AI turn was cut short (barge-in, turn preemption, LLM error,
    /// or stop).
    AiTurnInterrupted {
        partial_text: String,
        metrics: AiTurnMetrics,
    },

    /// VAD speech probability, forwarded only in debug mode.
    VadProbability { value: f32 },
}

impl AgentEventKind {
    /// Short stable name, useful for logs and assertions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgentStarted => "agent:started",
            Self::AgentStopped => "agent:stopped",
            Self::AgentError { .. } => "agent:error",
            Self::HumanTurnStarted => "human-turn:started",
            Self::HumanTurnTranscript { .. } => "human-turn:transcript",
            Self::HumanTurnEnded { .. } => "human-turn:ended",
            Self::HumanTurnAbandoned { .. } => "human-turn:abandoned",
            Self::AiTurnStarted => "ai-turn:started",
            Self::AiTurnToken { .. } => "ai-turn:token",
            Self::AiTurnSentence { .. } => "ai-turn:sentence",
            Self::AiTurnAudio { .. } => "ai-turn:audio",
            Self::AiTurnEnded { .. } => "ai-turn:ended",
            Self::AiTurnInterrupted { .. } => "ai-turn:interrupted",
            Self::VadProbability { .. } => "vad:probability",
        }
    }
}

/// Callback invoked synchronously for every public event.
pub type EventCallback = Arc<dyn Fn(AgentEvent) + Send + Sync>;
