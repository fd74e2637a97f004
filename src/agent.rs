//! The public agent facade.
//!
//! Owns the orchestrator and the consumer side of the audio stream, and
//! exposes the session lifecycle: start, stop, audio ingestion, the
//! synthesized-audio stream, and state snapshots.

use crate::audio::preprocessor::AudioPreprocessor;
use crate::audio::{AudioInput, NormalizedAudioFormat};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::message::Message;
use crate::metrics::AgentMetrics;
use crate::pipeline::coordinator::{Coordinator, SharedState};
use crate::pipeline::messages::InternalEvent;
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// The consumer side of the synthesized-audio path.
///
/// Chunks arrive in the agent's output format. The queue behind this
/// stream is bounded; when the consumer falls behind, the agent drops
/// new chunks instead of buffering without bound.
pub struct AudioStream {
    rx: mpsc::Receiver<Bytes>,
}

impl AudioStream {
    /// Receive the next audio chunk. Returns `None` once the session has
    /// stopped and the queue is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Adapt into a [`futures_util::Stream`] of chunks.
    pub fn into_stream(self) -> ReceiverStream<Bytes> {
        ReceiverStream::new(self.rx)
    }
}

/// A point-in-time view of the conversation.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub messages: Vec<Message>,
    pub is_running: bool,
    pub is_speaking: bool,
    pub metrics: AgentMetrics,
}

enum Lifecycle {
    Idle {
        config: Box<AgentConfig>,
        audio_out_tx: mpsc::Sender<Bytes>,
    },
    Running {
        internal_tx: mpsc::UnboundedSender<InternalEvent>,
        session_cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// A single-session, real-time, interruptible voice agent.
///
/// One agent is one conversation: `idle → running → stopped`, with no
/// restart. `start` and `stop` are idempotent; audio sent outside the
/// running state is dropped, never queued.
pub struct Agent {
    shared: Arc<SharedState>,
    state: Mutex<Lifecycle>,
    preprocessor: Mutex<AudioPreprocessor>,
    audio_out_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    input_format: NormalizedAudioFormat,
    output_format: NormalizedAudioFormat,
}

impl Agent {
    /// Build an agent from configuration.
    ///
    /// The input path is validated here: the caller's declared input
    /// format (or the STT provider's default) must be convertible to the
    /// STT provider's format.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for undecodable input encodings or
    /// a non-PCM STT input format.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let stt_format = config.stt.default_input_format();
        let source_format = config.audio.input.unwrap_or(stt_format);
        let preprocessor = AudioPreprocessor::new(source_format, stt_format)?;

        let output_format = config
            .audio
            .output
            .unwrap_or_else(|| config.tts.default_output_format())
            .normalized();

        let (audio_out_tx, audio_out_rx) =
            mpsc::channel(config.audio.output_queue_chunks.max(1));
        let shared = Arc::new(SharedState::new(config.initial_messages.clone()));
        let input_format = preprocessor.source_format();

        Ok(Self {
            shared,
            state: Mutex::new(Lifecycle::Idle {
                config: Box::new(config),
                audio_out_tx,
            }),
            preprocessor: Mutex::new(preprocessor),
            audio_out_rx: Mutex::new(Some(audio_out_rx)),
            input_format,
            output_format,
        })
    }

    /// Start the session. Requires a tokio runtime. Calling `start` on a
    /// running (or stopped) agent is a no-op.
    pub fn start(&self) {
        let mut state = lock(&self.state);
        match &*state {
            Lifecycle::Running { .. } => {
                debug!("start called on a running agent; ignoring");
                return;
            }
            Lifecycle::Stopped => {
                warn!("start called on a stopped agent; sessions do not restart");
                return;
            }
            Lifecycle::Idle { .. } => {}
        }

        let Lifecycle::Idle {
            config,
            audio_out_tx,
        } = std::mem::replace(&mut *state, Lifecycle::Stopped)
        else {
            unreachable!("lifecycle checked above");
        };

        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let session_cancel = CancellationToken::new();
        let coordinator = Coordinator::new(
            *config,
            Arc::clone(&self.shared),
            internal_tx.clone(),
            internal_rx,
            audio_out_tx,
            session_cancel.clone(),
        );
        let task = tokio::spawn(coordinator.run());

        *state = Lifecycle::Running {
            internal_tx,
            session_cancel,
            task,
        };
    }

    /// Stop the session and wait for teardown. Idempotent; the terminal
    /// `agent:stopped` event is emitted exactly once.
    pub async fn stop(&self) {
        let previous = {
            let mut state = lock(&self.state);
            std::mem::replace(&mut *state, Lifecycle::Stopped)
        };
        match previous {
            Lifecycle::Running {
                internal_tx,
                session_cancel,
                task,
            } => {
                if internal_tx.send(InternalEvent::Stop).is_err() {
                    session_cancel.cancel();
                }
                let _ = task.await;
            }
            Lifecycle::Idle { .. } => {
                debug!("stop called before start; nothing to tear down");
            }
            Lifecycle::Stopped => {}
        }
    }

    /// Feed one chunk of caller audio.
    ///
    /// The chunk is normalized to the STT provider's format and fanned
    /// out to the STT and VAD actors. Outside the running state the
    /// chunk is dropped silently.
    ///
    /// # Errors
    ///
    /// Returns an error when the chunk cannot be decoded under the
    /// configured input format.
    pub fn send_audio(&self, input: impl Into<AudioInput>) -> Result<()> {
        let input = input.into();
        if input.is_empty() {
            return Ok(());
        }
        let bytes = {
            let mut preprocessor = lock(&self.preprocessor);
            preprocessor.process(input)?
        };

        let state = lock(&self.state);
        if let Lifecycle::Running { internal_tx, .. } = &*state {
            let _ = internal_tx.send(InternalEvent::AudioInput(bytes));
        } else {
            trace!("dropping {} bytes of audio outside running state", bytes.len());
        }
        Ok(())
    }

    /// Take the synthesized-audio stream. Yields `None` after the first
    /// call: there is exactly one consumer.
    pub fn audio_stream(&self) -> Option<AudioStream> {
        lock(&self.audio_out_rx).take().map(|rx| AudioStream { rx })
    }

    /// A point-in-time view of messages, flags, and metrics.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            messages: lock(&self.shared.messages).clone(),
            is_running: self.shared.is_running.load(Ordering::Acquire),
            is_speaking: self.shared.is_speaking.load(Ordering::Acquire),
            metrics: lock(&self.shared.metrics).clone(),
        }
    }

    /// The resolved format callers should send audio in.
    pub fn input_format(&self) -> NormalizedAudioFormat {
        self.input_format
    }

    /// The declared format of the audio stream chunks.
    pub fn output_format(&self) -> NormalizedAudioFormat {
        self.output_format
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
