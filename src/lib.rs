//! Parlance: real-time, interruptible voice agents.
//!
//! This crate orchestrates three caller-supplied capabilities — speech-to-
//! text, a language model, and text-to-speech, plus optional VAD and
//! turn-detection — into one conversational loop:
//! Microphone audio → STT → LLM → sentence-level TTS → audio stream.
//!
//! # Architecture
//!
//! The pipeline is built from independent tokio tasks connected by
//! channels:
//! - **Preprocessor**: normalizes caller audio (PCM, G.711, WAV, WebM,
//!   Opus) to the STT provider's format
//! - **Provider actors**: bridge provider callbacks to internal events,
//!   honoring cancellation and per-call deadlines
//! - **Coordinator**: the turn-taking state machine — barge-in
//!   interruption, the sentence queue, silence prompting, and a totally
//!   ordered public event stream
//! - **Streamer**: feeds the bounded consumer-facing audio stream,
//!   dropping chunks under backpressure
//!
//! The core performs no network I/O and keeps no persistent state; one
//! agent is one conversation.
//!
//! # Example
//!
//! ```no_run
//! use parlance::{Agent, AgentConfig, LlmProvider};
//! use futures_util::FutureExt;
//! use std::sync::Arc;
//!
//! # async fn example(stt: Arc<dyn parlance::SpeechToText>, tts: Arc<dyn parlance::TextToSpeech>) -> parlance::Result<()> {
//! let llm = LlmProvider::from_fn(|_messages, ctx| {
//!     async move {
//!         ctx.token("Hi");
//!         ctx.sentence("Hi there.", 0);
//!         ctx.complete("Hi there.");
//!         Ok(())
//!     }
//!     .boxed()
//! });
//!
//! let config = AgentConfig::new(stt, llm, tts)
//!     .on_event(|event| println!("{}", event.kind.name()));
//! let agent = Agent::new(config)?;
//! let mut audio = agent.audio_stream().expect("first consumer");
//!
//! agent.start();
//! agent.send_audio(vec![0i16; 320])?;
//! while let Some(chunk) = audio.recv().await {
//!     // play chunk
//!     let _ = chunk;
//! }
//! agent.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod metrics;
mod pipeline;
pub mod provider;

pub use agent::{Agent, AgentSnapshot, AudioStream};
pub use audio::{AudioEncoding, AudioFormat, AudioInput, NormalizedAudioFormat};
pub use config::{
    AgentConfig, AudioOptions, InterruptionConfig, SilenceConfig, SilenceStartMode, TimeoutConfig,
};
pub use error::{AgentError, ErrorSource, Result};
pub use event::{AgentEvent, AgentEventKind, EventCallback};
pub use message::{Message, MessagePart, Role};
pub use metrics::{AgentMetrics, AiTurnMetrics, HumanTurnMetrics, SessionMetrics, TurnMetrics};
pub use provider::{
    LanguageModel, LlmContext, LlmProvider, SpeechToText, SttContext, TextToSpeech, TtsContext,
    TurnContext, TurnDetector, VadContext, VoiceActivityDetector,
};
