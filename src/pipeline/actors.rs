//! Provider actor tasks.
//!
//! One cooperative task per live provider call. Each actor watches its
//! cancellation token, gates provider emits behind the context's aborted
//! flag, enforces the LLM/TTS deadlines, and tears the provider down on
//! exit. Actors never touch coordinator state; they only post internal
//! events.

use crate::message::Message;
use crate::pipeline::messages::{InternalEvent, TtsKind, TurnDetectorInput};
use crate::provider::{
    LlmContext, LlmProvider, SpeechToText, SttContext, TextToSpeech, TtsContext, TurnContext,
    TurnDetector, VadContext, VoiceActivityDetector,
};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Spawn the STT actor: starts the provider, forwards audio chunks into
/// it, and stops it when the session token fires.
pub(crate) fn spawn_stt_actor(
    stt: Arc<dyn SpeechToText>,
    tx: mpsc::UnboundedSender<InternalEvent>,
    cancel: CancellationToken,
) -> (JoinHandle<()>, mpsc::UnboundedSender<Bytes>) {
    let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<Bytes>();
    let handle = tokio::spawn(async move {
        let ctx = SttContext::new(tx, cancel.clone());
        if let Err(e) = stt.start(ctx.clone()).await {
            ctx.error(format!("failed to start: {e}"));
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                chunk = audio_rx.recv() => {
                    match chunk {
                        Some(bytes) => {
                            if let Err(e) = stt.send_audio(bytes).await {
                                ctx.error(format!("send_audio failed: {e}"));
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        ctx.set_aborted();
        if let Err(e) = stt.stop().await {
            warn!("STT provider stop failed: {e}");
        }
    });
    (handle, audio_tx)
}

/// Spawn the VAD actor, mirroring the STT actor's shape.
pub(crate) fn spawn_vad_actor(
    vad: Arc<dyn VoiceActivityDetector>,
    tx: mpsc::UnboundedSender<InternalEvent>,
    cancel: CancellationToken,
) -> (JoinHandle<()>, mpsc::UnboundedSender<Bytes>) {
    let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<Bytes>();
    let handle = tokio::spawn(async move {
        let ctx = VadContext::new(tx, cancel.clone());
        if let Err(e) = vad.start(ctx.clone()).await {
            ctx.error(format!("failed to start: {e}"));
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                chunk = audio_rx.recv() => {
                    match chunk {
                        Some(bytes) => {
                            if let Err(e) = vad.process_audio(bytes).await {
                                ctx.error(format!("process_audio failed: {e}"));
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        ctx.set_aborted();
        if let Err(e) = vad.stop().await {
            warn!("VAD provider stop failed: {e}");
        }
    });
    (handle, audio_tx)
}

/// Spawn the turn-detector actor: forwards transcripts and speech-end
/// markers into the detector.
pub(crate) fn spawn_turn_detector_actor(
    detector: Arc<dyn TurnDetector>,
    tx: mpsc::UnboundedSender<InternalEvent>,
    cancel: CancellationToken,
) -> (JoinHandle<()>, mpsc::UnboundedSender<TurnDetectorInput>) {
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<TurnDetectorInput>();
    let handle = tokio::spawn(async move {
        let ctx = TurnContext::new(tx, cancel.clone());
        if let Err(e) = detector.start(ctx.clone()).await {
            ctx.error(format!("failed to start: {e}"));
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                input = input_rx.recv() => {
                    let result = match input {
                        Some(TurnDetectorInput::Transcript { text, is_final }) => {
                            detector.on_transcript(&text, is_final).await
                        }
                        Some(TurnDetectorInput::SpeechEnd { duration_ms }) => {
                            detector.on_speech_end(duration_ms).await
                        }
                        None => break,
                    };
                    if let Err(e) = result {
                        ctx.error(e.to_string());
                    }
                }
            }
        }

        ctx.set_aborted();
        if let Err(e) = detector.stop().await {
            warn!("turn detector stop failed: {e}");
        }
    });
    (handle, input_tx)
}

/// Spawn one LLM generation for the current AI turn.
///
/// The call races the turn cancellation token and the configured
/// deadline; on timeout a synthetic provider error is posted and further
/// emits are suppressed.
pub(crate) fn spawn_llm_actor(
    llm: LlmProvider,
    messages: Vec<Message>,
    tx: mpsc::UnboundedSender<InternalEvent>,
    cancel: CancellationToken,
    timeout_ms: u64,
    turn_id: u64,
    speaking: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctx = LlmContext::new(tx, cancel.clone(), turn_id, speaking);
        tokio::select! {
            () = cancel.cancelled() => {
                ctx.set_aborted();
            }
            () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                ctx.error(format!("generation timed out after {timeout_ms}ms"));
                ctx.set_aborted();
            }
            result = llm.generate(messages, ctx.clone()) => {
                if let Err(e) = result {
                    ctx.error(e.to_string());
                }
            }
        }
    })
}

/// Spawn one TTS synthesis for a sentence (queue) or filler utterance.
pub(crate) fn spawn_tts_actor(
    tts: Arc<dyn TextToSpeech>,
    text: String,
    tx: mpsc::UnboundedSender<InternalEvent>,
    cancel: CancellationToken,
    timeout_ms: u64,
    turn_id: u64,
    kind: TtsKind,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctx = TtsContext::new(tx, cancel.clone(), turn_id, kind);
        tokio::select! {
            () = cancel.cancelled() => {
                ctx.set_aborted();
            }
            () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                ctx.error(format!("synthesis timed out after {timeout_ms}ms"));
                ctx.set_aborted();
            }
            result = tts.synthesize(&text, ctx.clone()) => {
                if let Err(e) = result {
                    ctx.error(e.to_string());
                }
            }
        }
    })
}
