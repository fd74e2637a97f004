//! Provider capability contracts.
//!
//! The agent orchestrates five externally supplied capabilities: STT, an
//! LLM, TTS, and optional VAD and turn-detection. Each provider receives
//! a per-call context whose emit methods post into the agent's internal
//! event stream.
//!
//! Contexts carry the cancellation token for the call; providers must
//! stop work when it fires, and emits after cancellation are dropped.

use crate::audio::{AudioEncoding, AudioFormat};
use crate::error::Result;
use crate::message::Message;
use crate::metrics::now_ms;
use crate::pipeline::messages::{
    FillerEvent, InternalEvent, LlmEvent, SttEvent, TtsEvent, TtsKind, TurnEvent, VadEvent,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shared plumbing behind every provider context.
struct EmitInner {
    tx: mpsc::UnboundedSender<InternalEvent>,
    aborted: AtomicBool,
    cancel: CancellationToken,
}

impl EmitInner {
    fn post(&self, event: InternalEvent) {
        if self.aborted.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            return;
        }
        let _ = self.tx.send(event);
    }
}

macro_rules! context_common {
    () => {
        /// The cancellation token for this call. Providers must observe
        /// it and cease work (and emits) once it fires.
        pub fn cancellation(&self) -> &CancellationToken {
            &self.inner.cancel
        }

        pub(crate) fn set_aborted(&self) {
            self.inner.aborted.store(true, Ordering::Release);
        }
    };
}

/// Emit context handed to [`SpeechToText::start`].
#[derive(Clone)]
pub struct SttContext {
    inner: Arc<EmitInner>,
}

impl SttContext {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<InternalEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(EmitInner {
                tx,
                aborted: AtomicBool::new(false),
                cancel,
            }),
        }
    }

    context_common!();

    /// Report a transcription hypothesis. Partial results carry
    /// `is_final = false`; the stable result carries `true`.
    pub fn transcript(&self, text: impl Into<String>, is_final: bool) {
        self.inner.post(InternalEvent::Stt(SttEvent::Transcript {
            text: text.into(),
            is_final,
            at_ms: now_ms(),
        }));
    }

    /// Report that the provider detected the start of user speech.
    pub fn speech_start(&self) {
        self.inner
            .post(InternalEvent::Stt(SttEvent::SpeechStart { at_ms: now_ms() }));
    }

    /// Report that the provider detected the end of user speech.
    pub fn speech_end(&self) {
        self.inner
            .post(InternalEvent::Stt(SttEvent::SpeechEnd { at_ms: now_ms() }));
    }

    /// Report a provider error. STT errors are non-fatal to the session.
    pub fn error(&self, message: impl Into<String>) {
        self.inner.post(InternalEvent::Stt(SttEvent::Error {
            message: message.into(),
            at_ms: now_ms(),
        }));
    }
}

/// Emit context handed to [`LanguageModel::generate`].
#[derive(Clone)]
pub struct LlmContext {
    inner: Arc<EmitInner>,
    turn_id: u64,
    speaking: Arc<AtomicBool>,
}

impl LlmContext {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<InternalEvent>,
        cancel: CancellationToken,
        turn_id: u64,
        speaking: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(EmitInner {
                tx,
                aborted: AtomicBool::new(false),
                cancel,
            }),
            turn_id,
            speaking,
        }
    }

    context_common!();

    fn post_llm(&self, event: LlmEvent) {
        self.inner.post(InternalEvent::Llm {
            turn_id: self.turn_id,
            event,
        });
    }

    /// Stream one generated token.
    pub fn token(&self, text: impl Into<String>) {
        self.post_llm(LlmEvent::Token {
            text: text.into(),
            at_ms: now_ms(),
        });
    }

    /// Hand one complete sentence to the TTS queue.
    pub fn sentence(&self, text: impl Into<String>, index: usize) {
        self.post_llm(LlmEvent::Sentence {
            text: text.into(),
            index,
            at_ms: now_ms(),
        });
    }

    /// Signal the end of generation with the full response text.
    pub fn complete(&self, full_text: impl Into<String>) {
        self.post_llm(LlmEvent::Complete {
            full_text: full_text.into(),
            at_ms: now_ms(),
        });
    }

    /// Report a generation error. This aborts the current AI turn.
    pub fn error(&self, message: impl Into<String>) {
        self.post_llm(LlmEvent::Error {
            message: message.into(),
            at_ms: now_ms(),
        });
    }

    /// Request a filler utterance spoken outside the sentence queue,
    /// e.g. "let me think" while a tool call runs.
    pub fn say(&self, text: impl Into<String>) {
        self.inner
            .post(InternalEvent::Filler(FillerEvent::Say { text: text.into() }));
    }

    /// Cancel the current filler utterance, if one is playing.
    pub fn interrupt(&self) {
        self.inner.post(InternalEvent::Filler(FillerEvent::Interrupt));
    }

    /// Whether the agent is audibly speaking right now.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }
}

/// Emit context handed to [`TextToSpeech::synthesize`].
#[derive(Clone)]
pub struct TtsContext {
    inner: Arc<EmitInner>,
    turn_id: u64,
    kind: TtsKind,
}

impl TtsContext {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<InternalEvent>,
        cancel: CancellationToken,
        turn_id: u64,
        kind: TtsKind,
    ) -> Self {
        Self {
            inner: Arc::new(EmitInner {
                tx,
                aborted: AtomicBool::new(false),
                cancel,
            }),
            turn_id,
            kind,
        }
    }

    context_common!();

    fn post_tts(&self, event: TtsEvent) {
        self.inner.post(InternalEvent::Tts {
            turn_id: self.turn_id,
            kind: self.kind,
            event,
        });
    }

    /// Stream one chunk of synthesized audio in the provider's declared
    /// output format.
    pub fn audio_chunk(&self, bytes: impl Into<Bytes>) {
        self.post_tts(TtsEvent::Chunk {
            bytes: bytes.into(),
            at_ms: now_ms(),
        });
    }

    /// Signal that synthesis for this text finished.
    pub fn complete(&self) {
        self.post_tts(TtsEvent::Complete { at_ms: now_ms() });
    }

    /// Report a synthesis error. The sentence queue continues with the
    /// next pending sentence.
    pub fn error(&self, message: impl Into<String>) {
        self.post_tts(TtsEvent::Error {
            message: message.into(),
            at_ms: now_ms(),
        });
    }
}

/// Emit context handed to [`VoiceActivityDetector::start`].
#[derive(Clone)]
pub struct VadContext {
    inner: Arc<EmitInner>,
}

impl VadContext {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<InternalEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(EmitInner {
                tx,
                aborted: AtomicBool::new(false),
                cancel,
            }),
        }
    }

    context_common!();

    /// Report the start of user speech.
    pub fn speech_start(&self) {
        self.inner
            .post(InternalEvent::Vad(VadEvent::SpeechStart { at_ms: now_ms() }));
    }

    /// Report the end of user speech and how long it lasted.
    pub fn speech_end(&self, duration_ms: u64) {
        self.inner.post(InternalEvent::Vad(VadEvent::SpeechEnd {
            duration_ms,
            at_ms: now_ms(),
        }));
    }

    /// Report the current speech probability (forwarded to consumers in
    /// debug mode only).
    pub fn speech_probability(&self, value: f32) {
        self.inner.post(InternalEvent::Vad(VadEvent::Probability {
            value,
            at_ms: now_ms(),
        }));
    }

    /// Report a provider error.
    pub fn error(&self, message: impl Into<String>) {
        self.inner.post(InternalEvent::Vad(VadEvent::Error {
            message: message.into(),
            at_ms: now_ms(),
        }));
    }
}

/// Emit context handed to [`TurnDetector::start`].
#[derive(Clone)]
pub struct TurnContext {
    inner: Arc<EmitInner>,
}

impl TurnContext {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<InternalEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(EmitInner {
                tx,
                aborted: AtomicBool::new(false),
                cancel,
            }),
        }
    }

    context_common!();

    /// Declare the human turn complete with its final transcript.
    pub fn turn_end(&self, transcript: impl Into<String>) {
        self.inner.post(InternalEvent::Turn(TurnEvent::TurnEnd {
            transcript: transcript.into(),
            at_ms: now_ms(),
        }));
    }

    /// Discard the human turn (e.g. non-speech noise, self-talk).
    pub fn turn_abandoned(&self, reason: impl Into<String>) {
        self.inner
            .post(InternalEvent::Turn(TurnEvent::TurnAbandoned {
                reason: reason.into(),
                at_ms: now_ms(),
            }));
    }

    /// Report a provider error.
    pub fn error(&self, message: impl Into<String>) {
        self.inner.post(InternalEvent::Turn(TurnEvent::Error {
            message: message.into(),
            at_ms: now_ms(),
        }));
    }
}

/// Speech-to-text capability.
///
/// The agent calls `start` once per session, streams normalized audio via
/// `send_audio`, and calls `stop` at teardown. Results and speech
/// boundaries are reported through the context.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Open the transcription session.
    async fn start(&self, ctx: SttContext) -> Result<()>;

    /// Feed one chunk of audio in the provider's input format.
    async fn send_audio(&self, audio: Bytes) -> Result<()>;

    /// Close the transcription session.
    async fn stop(&self) -> Result<()>;

    /// Formats this provider can ingest.
    fn supported_input_formats(&self) -> Vec<AudioFormat> {
        vec![self.default_input_format()]
    }

    /// The format the preprocessor should produce for this provider.
    fn default_input_format(&self) -> AudioFormat {
        AudioFormat::with_rate(AudioEncoding::Linear16, 16_000, 1)
    }
}

/// Language model capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a streamed response to the conversation so far.
    ///
    /// Implementations emit `token`/`sentence` events as text is
    /// produced and must finish with `complete` (or `error`).
    async fn generate(&self, messages: Vec<Message>, ctx: LlmContext) -> Result<()>;
}

/// A plain generator function usable in place of a full LLM provider.
pub type GeneratorFn =
    dyn Fn(Vec<Message>, LlmContext) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// The LLM slot accepts either a provider object or a bare generator
/// function; both dispatch through the same actor.
#[derive(Clone)]
pub enum LlmProvider {
    Provider(Arc<dyn LanguageModel>),
    Generator(Arc<GeneratorFn>),
}

impl LlmProvider {
    /// Wrap a closure as the LLM.
    pub fn from_fn<F>(generator: F) -> Self
    where
        F: Fn(Vec<Message>, LlmContext) -> BoxFuture<'static, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self::Generator(Arc::new(generator))
    }

    pub(crate) async fn generate(&self, messages: Vec<Message>, ctx: LlmContext) -> Result<()> {
        match self {
            Self::Provider(provider) => provider.generate(messages, ctx).await,
            Self::Generator(generator) => generator(messages, ctx).await,
        }
    }
}

impl<T: LanguageModel + 'static> From<Arc<T>> for LlmProvider {
    fn from(provider: Arc<T>) -> Self {
        Self::Provider(provider)
    }
}

impl std::fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider(_) => f.write_str("LlmProvider::Provider"),
            Self::Generator(_) => f.write_str("LlmProvider::Generator"),
        }
    }
}

/// Text-to-speech capability. One `synthesize` call per sentence.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text`, streaming audio chunks through the context and
    /// finishing with `complete` (or `error`).
    async fn synthesize(&self, text: &str, ctx: TtsContext) -> Result<()>;

    /// Formats this provider can produce.
    fn supported_output_formats(&self) -> Vec<AudioFormat> {
        vec![self.default_output_format()]
    }

    /// The format of the chunks this provider emits.
    fn default_output_format(&self) -> AudioFormat {
        AudioFormat::with_rate(AudioEncoding::Linear16, 24_000, 1)
    }
}

/// Optional voice-activity detection capability. When present, its
/// speech boundaries drive turn-taking and barge-in instead of the STT
/// provider's.
#[async_trait]
pub trait VoiceActivityDetector: Send + Sync {
    async fn start(&self, ctx: VadContext) -> Result<()>;

    /// Feed one chunk of normalized audio.
    async fn process_audio(&self, audio: Bytes) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Optional turn-detection capability. When present, the agent waits for
/// `turn_end` instead of treating final STT transcripts as turn
/// boundaries.
#[async_trait]
pub trait TurnDetector: Send + Sync {
    async fn start(&self, ctx: TurnContext) -> Result<()>;

    /// Observe the end of a speech segment.
    async fn on_speech_end(&self, duration_ms: u64) -> Result<()>;

    /// Observe a transcription hypothesis.
    async fn on_transcript(&self, text: &str, is_final: bool) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}
