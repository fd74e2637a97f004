//! Agent configuration.
//!
//! [`AgentConfig`] carries the providers plus tuning sections. The tuning
//! sections are plain serde-friendly structs with defaults chosen for
//! conversational agents.

use crate::audio::AudioFormat;
use crate::event::EventCallback;
use crate::provider::{
    LlmProvider, SpeechToText, TextToSpeech, TurnDetector, VoiceActivityDetector,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Barge-in behavior while the agent is speaking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptionConfig {
    /// Whether user speech interrupts the agent mid-response.
    pub enabled: bool,
    /// Minimum sustained speech before the STT fallback treats it as a
    /// barge-in rather than noise.
    pub min_duration_ms: u64,
}

impl Default for InterruptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_duration_ms: 200,
        }
    }
}

/// When the silence-prompt timer starts counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SilenceStartMode {
    /// Arm the timer as soon as the session starts.
    Always,
    /// Arm the timer only after the user has spoken once.
    AfterFirstSpeech,
}

/// Silence prompting: speak up when the conversation stalls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SilenceConfig {
    pub enabled: bool,
    /// Idle time before the agent prompts.
    pub timeout_ms: u64,
    pub start_mode: SilenceStartMode,
    /// What the agent says when the timer fires.
    pub prompt_message: String,
    /// Prompts per silence stretch; resets when the user speaks.
    pub max_prompts: u32,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 10_000,
            start_mode: SilenceStartMode::AfterFirstSpeech,
            prompt_message: "Are you still there?".to_owned(),
            max_prompts: 2,
        }
    }
}

/// Per-call provider deadlines.
///
/// The defaults suit conversational agents; they are recommendations, not
/// guarantees, and long-form generation may need larger values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for one LLM generation call.
    pub llm_ms: u64,
    /// Deadline for synthesizing one sentence.
    pub tts_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_ms: 30_000,
            tts_ms: 10_000,
        }
    }
}

/// Audio formats at the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOptions {
    /// Format of caller-supplied audio. Defaults to the STT provider's
    /// declared input format.
    pub input: Option<AudioFormat>,
    /// Declared format of the audio stream chunks. Defaults to the TTS
    /// provider's declared output format.
    pub output: Option<AudioFormat>,
    /// Capacity of the output audio queue, in chunks. When the consumer
    /// falls this far behind, new chunks are dropped.
    pub output_queue_chunks: usize,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            output_queue_chunks: 32,
        }
    }
}

/// Everything needed to build an [`crate::Agent`].
#[derive(Clone)]
pub struct AgentConfig {
    pub stt: Arc<dyn SpeechToText>,
    pub llm: LlmProvider,
    pub tts: Arc<dyn TextToSpeech>,
    pub vad: Option<Arc<dyn VoiceActivityDetector>>,
    pub turn_detector: Option<Arc<dyn TurnDetector>>,
    pub audio: AudioOptions,
    pub interruption: InterruptionConfig,
    pub silence: SilenceConfig,
    pub timeout: TimeoutConfig,
    /// History bound; oldest non-system messages are evicted beyond it.
    pub max_messages: usize,
    /// Forward debug-only events (VAD probabilities) and extra logging.
    pub debug: bool,
    /// Synchronous observer for every public event.
    pub on_event: Option<EventCallback>,
    /// Messages seeded into the conversation before the first turn.
    pub initial_messages: Vec<crate::message::Message>,
}

impl AgentConfig {
    /// Configuration with the three required providers and defaults for
    /// everything else.
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        llm: impl Into<LlmProvider>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        Self {
            stt,
            llm: llm.into(),
            tts,
            vad: None,
            turn_detector: None,
            audio: AudioOptions::default(),
            interruption: InterruptionConfig::default(),
            silence: SilenceConfig::default(),
            timeout: TimeoutConfig::default(),
            max_messages: 100,
            debug: false,
            on_event: None,
            initial_messages: Vec::new(),
        }
    }

    /// Attach a VAD provider. Its speech boundaries take over turn-taking
    /// and barge-in detection from the STT provider.
    pub fn with_vad(mut self, vad: Arc<dyn VoiceActivityDetector>) -> Self {
        self.vad = Some(vad);
        self
    }

    /// Attach a turn detector. Final STT transcripts then no longer end
    /// the human turn on their own.
    pub fn with_turn_detector(mut self, detector: Arc<dyn TurnDetector>) -> Self {
        self.turn_detector = Some(detector);
        self
    }

    pub fn with_audio(mut self, audio: AudioOptions) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_interruption(mut self, interruption: InterruptionConfig) -> Self {
        self.interruption = interruption;
        self
    }

    pub fn with_silence(mut self, silence: SilenceConfig) -> Self {
        self.silence = silence;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Register the event callback.
    pub fn on_event(mut self, callback: impl Fn(crate::event::AgentEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(callback));
        self
    }

    /// Seed the conversation, e.g. with a system prompt.
    pub fn with_initial_messages(mut self, messages: Vec<crate::message::Message>) -> Self {
        self.initial_messages = messages;
        self
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("vad", &self.vad.is_some())
            .field("turn_detector", &self.turn_detector.is_some())
            .field("audio", &self.audio)
            .field("interruption", &self.interruption)
            .field("silence", &self.silence)
            .field("timeout", &self.timeout)
            .field("max_messages", &self.max_messages)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_defaults() {
        let config = InterruptionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.min_duration_ms, 200);
    }

    #[test]
    fn timeout_defaults() {
        let config = TimeoutConfig::default();
        assert_eq!(config.llm_ms, 30_000);
        assert_eq!(config.tts_ms, 10_000);
    }

    #[test]
    fn silence_config_roundtrips_through_serde() {
        let config = SilenceConfig {
            enabled: true,
            timeout_ms: 5_000,
            start_mode: SilenceStartMode::Always,
            prompt_message: "Hello?".to_owned(),
            max_prompts: 1,
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: SilenceConfig = serde_json::from_str(&json).expect("deserialize");
        assert!(back.enabled);
        assert_eq!(back.start_mode, SilenceStartMode::Always);
        assert_eq!(back.prompt_message, "Hello?");
    }
}
