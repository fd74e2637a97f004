//! Shared mock providers and helpers for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parlance::{
    AgentEvent, AgentEventKind, SpeechToText, SttContext, TextToSpeech, TtsContext, TurnContext,
    TurnDetector, VadContext, VoiceActivityDetector,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

/// Install the test tracing subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Poll `f` every 10 ms until it yields a value, for at most 3 s.
pub async fn wait_until<T>(f: impl Fn() -> Option<T>) -> T {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Some(value) = f() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 3s")
}

/// Collects every public event for later assertions.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<AgentEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorder(&self) -> impl Fn(AgentEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event| events.lock().expect("event log lock").push(event)
    }

    pub fn kinds(&self) -> Vec<AgentEventKind> {
        self.events
            .lock()
            .expect("event log lock")
            .iter()
            .map(|e| e.kind.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("event log lock")
            .iter()
            .map(|e| e.kind.name())
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }

    pub async fn wait_for(&self, name: &str) {
        self.wait_for_count(name, 1).await;
    }

    pub async fn wait_for_count(&self, name: &str, count: usize) {
        let log = self.clone();
        let name = name.to_owned();
        wait_until(move || (log.count(&name) >= count).then_some(())).await;
    }
}

/// STT mock: records audio and hands its emit context to the test.
#[derive(Default)]
pub struct MockStt {
    ctx: Mutex<Option<SttContext>>,
    pub audio: Mutex<Vec<Bytes>>,
    pub started: AtomicBool,
    pub stopped: AtomicBool,
}

impl MockStt {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The context captured at `start`, once the session is running.
    pub async fn context(&self) -> SttContext {
        wait_until(|| self.ctx.lock().expect("ctx lock").clone()).await
    }

    pub fn received_audio(&self) -> Vec<Bytes> {
        self.audio.lock().expect("audio lock").clone()
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn start(&self, ctx: SttContext) -> parlance::Result<()> {
        *self.ctx.lock().expect("ctx lock") = Some(ctx);
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send_audio(&self, audio: Bytes) -> parlance::Result<()> {
        self.audio.lock().expect("audio lock").push(audio);
        Ok(())
    }

    async fn stop(&self) -> parlance::Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// VAD mock: hands its emit context to the test.
#[derive(Default)]
pub struct MockVad {
    ctx: Mutex<Option<VadContext>>,
    pub audio: Mutex<Vec<Bytes>>,
}

impl MockVad {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn context(&self) -> VadContext {
        wait_until(|| self.ctx.lock().expect("ctx lock").clone()).await
    }
}

#[async_trait]
impl VoiceActivityDetector for MockVad {
    async fn start(&self, ctx: VadContext) -> parlance::Result<()> {
        *self.ctx.lock().expect("ctx lock") = Some(ctx);
        Ok(())
    }

    async fn process_audio(&self, audio: Bytes) -> parlance::Result<()> {
        self.audio.lock().expect("audio lock").push(audio);
        Ok(())
    }

    async fn stop(&self) -> parlance::Result<()> {
        Ok(())
    }
}

/// Turn-detector mock: records what the agent forwards into it.
#[derive(Default)]
pub struct MockTurnDetector {
    ctx: Mutex<Option<TurnContext>>,
    pub transcripts: Mutex<Vec<(String, bool)>>,
    pub speech_ends: Mutex<Vec<u64>>,
}

impl MockTurnDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn context(&self) -> TurnContext {
        wait_until(|| self.ctx.lock().expect("ctx lock").clone()).await
    }

    pub fn final_transcripts(&self) -> Vec<String> {
        self.transcripts
            .lock()
            .expect("transcripts lock")
            .iter()
            .filter(|(_, is_final)| *is_final)
            .map(|(text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl TurnDetector for MockTurnDetector {
    async fn start(&self, ctx: TurnContext) -> parlance::Result<()> {
        *self.ctx.lock().expect("ctx lock") = Some(ctx);
        Ok(())
    }

    async fn on_speech_end(&self, duration_ms: u64) -> parlance::Result<()> {
        self.speech_ends
            .lock()
            .expect("speech ends lock")
            .push(duration_ms);
        Ok(())
    }

    async fn on_transcript(&self, text: &str, is_final: bool) -> parlance::Result<()> {
        self.transcripts
            .lock()
            .expect("transcripts lock")
            .push((text.to_owned(), is_final));
        Ok(())
    }

    async fn stop(&self) -> parlance::Result<()> {
        Ok(())
    }
}

/// TTS mock with scripted behavior per `synthesize` call.
pub struct ScriptedTts {
    chunks: Vec<Bytes>,
    /// Never complete; wait for cancellation instead.
    hold_open: bool,
    /// Emit an error instead of completing when synthesizing this text.
    fail_on: Option<String>,
    pub synthesized: Mutex<Vec<String>>,
}

impl ScriptedTts {
    /// Emit the given chunks, then complete.
    pub fn new(chunks: Vec<&'static [u8]>) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.into_iter().map(Bytes::from_static).collect(),
            hold_open: false,
            fail_on: None,
            synthesized: Mutex::new(Vec::new()),
        })
    }

    /// Emit the chunks, then stay busy until cancelled.
    pub fn holding_open(chunks: Vec<&'static [u8]>) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.into_iter().map(Bytes::from_static).collect(),
            hold_open: true,
            fail_on: None,
            synthesized: Mutex::new(Vec::new()),
        })
    }

    /// Emit the chunks, then error instead of completing for `text`.
    pub fn failing_on(chunks: Vec<&'static [u8]>, text: &str) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.into_iter().map(Bytes::from_static).collect(),
            hold_open: false,
            fail_on: Some(text.to_owned()),
            synthesized: Mutex::new(Vec::new()),
        })
    }

    pub fn synthesized_texts(&self) -> Vec<String> {
        self.synthesized.lock().expect("synthesized lock").clone()
    }
}

#[async_trait]
impl TextToSpeech for ScriptedTts {
    async fn synthesize(&self, text: &str, ctx: TtsContext) -> parlance::Result<()> {
        self.synthesized
            .lock()
            .expect("synthesized lock")
            .push(text.to_owned());
        for chunk in &self.chunks {
            ctx.audio_chunk(chunk.clone());
        }
        if self.hold_open {
            ctx.cancellation().cancelled().await;
            return Ok(());
        }
        if self.fail_on.as_deref() == Some(text) {
            ctx.error("synthesis backend failure");
            return Ok(());
        }
        ctx.complete();
        Ok(())
    }
}
