//! Session and per-turn metrics.
//!
//! Counters accumulate for the lifetime of a session; turn-scoped fields
//! reset when the AI turn ends, is interrupted, or the LLM errors out.
//! Derived latencies are computed at emit time and attached to turn-end
//! events.

use crate::error::ErrorSource;
use serde::Serialize;
use std::collections::HashMap;

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Session-lifetime counters. Never reset within a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    /// When the session entered `running`.
    pub session_started_at: Option<u64>,
    /// AI turns started (including silence prompts).
    pub total_turns: u64,
    /// AI turns that ran to completion.
    pub completed_turns: u64,
    /// AI turns cut short by barge-in, turn-end preemption, or LLM error.
    pub interrupted_turns: u64,
    /// Human turns abandoned by the turn detector.
    pub abandoned_turns: u64,
    /// Errors observed per provider.
    pub errors_by_source: HashMap<ErrorSource, u64>,
}

impl SessionMetrics {
    pub(crate) fn record_error(&mut self, source: ErrorSource) {
        *self.errors_by_source.entry(source).or_insert(0) += 1;
    }
}

/// Working state for the turns currently in flight.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnMetrics {
    pub human_turn_started_at: Option<u64>,
    pub human_turn_ended_at: Option<u64>,
    /// Accumulated user speech duration, from VAD or STT boundaries.
    pub human_speech_duration_ms: u64,
    pub human_transcript_length: u64,

    pub ai_turn_started_at: Option<u64>,
    pub first_token_at: Option<u64>,
    pub first_sentence_at: Option<u64>,
    pub first_audio_at: Option<u64>,
    pub token_count: u64,
    pub sentence_count: u64,
    pub chunk_count: u64,
    pub character_count: u64,
    pub byte_count: u64,
}

impl TurnMetrics {
    /// Snapshot of the human-turn fields for a `human-turn:ended` event.
    pub(crate) fn human_report(&self) -> HumanTurnMetrics {
        HumanTurnMetrics {
            started_at: self.human_turn_started_at,
            ended_at: self.human_turn_ended_at,
            speech_duration_ms: self.human_speech_duration_ms,
            transcript_length: self.human_transcript_length,
        }
    }

    /// Derived AI-turn latencies for turn-end events, relative to the
    /// turn start.
    pub(crate) fn ai_report(&self, ended_at: u64) -> AiTurnMetrics {
        let since_start = |at: Option<u64>| {
            self.ai_turn_started_at
                .zip(at)
                .map(|(start, t)| t.saturating_sub(start))
        };
        AiTurnMetrics {
            started_at: self.ai_turn_started_at,
            ended_at: Some(ended_at),
            time_to_first_token_ms: since_start(self.first_token_at),
            time_to_first_sentence_ms: since_start(self.first_sentence_at),
            time_to_first_audio_ms: since_start(self.first_audio_at),
            total_duration_ms: self
                .ai_turn_started_at
                .map(|start| ended_at.saturating_sub(start)),
            token_count: self.token_count,
            sentence_count: self.sentence_count,
            chunk_count: self.chunk_count,
            character_count: self.character_count,
            byte_count: self.byte_count,
        }
    }

    /// Reset the AI-turn fields. Human-turn fields are reset separately
    /// when a new human turn begins.
    pub(crate) fn reset_ai_turn(&mut self) {
        self.ai_turn_started_at = None;
        self.first_token_at = None;
        self.first_sentence_at = None;
        self.first_audio_at = None;
        self.token_count = 0;
        self.sentence_count = 0;
        self.chunk_count = 0;
        self.character_count = 0;
        self.byte_count = 0;
    }

    pub(crate) fn reset_human_turn(&mut self) {
        self.human_turn_started_at = None;
        self.human_turn_ended_at = None;
        self.human_speech_duration_ms = 0;
        self.human_transcript_length = 0;
    }
}

/// Human-turn metrics attached to `human-turn:ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HumanTurnMetrics {
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub speech_duration_ms: u64,
    pub transcript_length: u64,
}

/// AI-turn metrics attached to `ai-turn:ended` / `ai-turn:interrupted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiTurnMetrics {
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub time_to_first_token_ms: Option<u64>,
    pub time_to_first_sentence_ms: Option<u64>,
    pub time_to_first_audio_ms: Option<u64>,
    pub total_duration_ms: Option<u64>,
    pub token_count: u64,
    pub sentence_count: u64,
    pub chunk_count: u64,
    pub character_count: u64,
    pub byte_count: u64,
}

/// Combined metrics view returned from snapshots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentMetrics {
    pub session: SessionMetrics,
    pub turn: TurnMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_report_derives_latencies_from_turn_start() {
        let metrics = TurnMetrics {
            ai_turn_started_at: Some(1_000),
            first_token_at: Some(1_150),
            first_sentence_at: Some(1_400),
            first_audio_at: Some(1_900),
            token_count: 12,
            ..TurnMetrics::default()
        };
        let report = metrics.ai_report(2_500);
        assert_eq!(report.time_to_first_token_ms, Some(150));
        assert_eq!(report.time_to_first_sentence_ms, Some(400));
        assert_eq!(report.time_to_first_audio_ms, Some(900));
        assert_eq!(report.total_duration_ms, Some(1_500));
        assert_eq!(report.token_count, 12);
    }

    #[test]
    fn error_counters_accumulate_per_source() {
        let mut session = SessionMetrics::default();
        session.record_error(ErrorSource::Tts);
        session.record_error(ErrorSource::Tts);
        session.record_error(ErrorSource::Stt);
        assert_eq!(session.errors_by_source[&ErrorSource::Tts], 2);
        assert_eq!(session.errors_by_source[&ErrorSource::Stt], 1);
    }

    #[test]
    fn metrics_serialize_for_telemetry() {
        let metrics = AgentMetrics::default();
        let json = serde_json::to_value(&metrics).expect("serialize");
        assert!(json["session"]["total_turns"].is_u64());
    }
}
