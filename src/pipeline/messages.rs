//! Internal events passed from provider actors to the coordinator.
//!
//! Every payload carries the wall-clock time the actor posted it; the
//! coordinator stamps public events separately at emit time. LLM and TTS
//! events additionally carry the AI-turn generation that spawned them so
//! stale events from an aborted turn can be dropped at dispatch.

use bytes::Bytes;

/// Which synthesis path a TTS event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TtsKind {
    /// Sentence-queue synthesis for the current AI turn.
    Queue,
    /// Filler synthesis requested by the LLM via `say()`.
    Filler,
}

#[derive(Debug, Clone)]
pub(crate) enum SttEvent {
    Transcript {
        text: String,
        is_final: bool,
        at_ms: u64,
    },
    SpeechStart {
        at_ms: u64,
    },
    SpeechEnd {
        at_ms: u64,
    },
    Error {
        message: String,
        at_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum VadEvent {
    SpeechStart {
        at_ms: u64,
    },
    SpeechEnd {
        duration_ms: u64,
        at_ms: u64,
    },
    Probability {
        value: f32,
        at_ms: u64,
    },
    Error {
        message: String,
        at_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum TurnEvent {
    TurnEnd {
        transcript: String,
        at_ms: u64,
    },
    TurnAbandoned {
        reason: String,
        at_ms: u64,
    },
    Error {
        message: String,
        at_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum LlmEvent {
    Token {
        text: String,
        at_ms: u64,
    },
    Sentence {
        text: String,
        index: usize,
        at_ms: u64,
    },
    Complete {
        full_text: String,
        at_ms: u64,
    },
    Error {
        message: String,
        at_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum TtsEvent {
    Chunk { bytes: Bytes, at_ms: u64 },
    Complete { at_ms: u64 },
    Error { message: String, at_ms: u64 },
}

/// Filler requests plumbed from the LLM context.
#[derive(Debug, Clone)]
pub(crate) enum FillerEvent {
    Say { text: String },
    Interrupt,
}

/// Everything the coordinator's dispatch loop consumes.
#[derive(Debug, Clone)]
pub(crate) enum InternalEvent {
    /// Normalized caller audio to fan out to the STT and VAD actors.
    AudioInput(Bytes),
    /// Graceful stop requested by the facade.
    Stop,
    Stt(SttEvent),
    Vad(VadEvent),
    Turn(TurnEvent),
    Llm { turn_id: u64, event: LlmEvent },
    Tts {
        turn_id: u64,
        kind: TtsKind,
        event: TtsEvent,
    },
    Filler(FillerEvent),
}

/// Inputs forwarded into the turn-detector actor.
#[derive(Debug, Clone)]
pub(crate) enum TurnDetectorInput {
    Transcript { text: String, is_final: bool },
    SpeechEnd { duration_ms: u64 },
}
