//! The conversation orchestrator.
//!
//! A hierarchical, concurrent state machine: the root runs `idle →
//! running → stopped`, and while running, four conceptual regions share
//! one context over a single event stream:
//!
//! - **listening** — VAD/STT speech boundaries ([`ListeningState`]);
//! - **transcribing** — STT hypotheses and turn-ending guards;
//! - **responding** — LLM tokens/sentences (active while `llm_task` is
//!   live);
//! - **streaming** — TTS chunks and the sentence queue (active while
//!   `tts_task` or pending sentences exist).
//!
//! The coordinator is the only writer of conversation state. Provider
//! actors post [`InternalEvent`]s into one unbounded queue; the dispatch
//! loop consumes them one at a time, so public events inherit a total
//! order.
//!
//! Two cancellation scopes exist per session: the session token (fires on
//! stop, aborts everything) and the turn token (fires on barge-in or LLM
//! error, aborts the LLM and any in-flight TTS). LLM/TTS events carry the
//! turn generation that spawned them; events from an older generation are
//! dropped on arrival.

use crate::config::{AgentConfig, SilenceStartMode};
use crate::error::ErrorSource;
use crate::event::{AgentEvent, AgentEventKind, EventCallback};
use crate::message::{Message, push_bounded};
use crate::metrics::{AgentMetrics, now_ms};
use crate::pipeline::actors::{
    spawn_llm_actor, spawn_stt_actor, spawn_tts_actor, spawn_turn_detector_actor, spawn_vad_actor,
};
use crate::pipeline::messages::{
    FillerEvent, InternalEvent, LlmEvent, SttEvent, TtsEvent, TtsKind, TurnDetectorInput,
    TurnEvent, VadEvent,
};
use crate::pipeline::streamer::run_streamer;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where speech boundaries and turn endings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalSource {
    /// A dedicated adapter provider supplies the signal.
    Adapter,
    /// The STT provider's own events are used as a fallback.
    Stt,
}

/// Listening region substates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListeningState {
    Idle,
    UserSpeaking,
}

/// State shared between the coordinator, the facade, and LLM contexts.
pub(crate) struct SharedState {
    pub is_running: AtomicBool,
    pub is_speaking: Arc<AtomicBool>,
    pub messages: Mutex<Vec<Message>>,
    pub metrics: Mutex<AgentMetrics>,
}

impl SharedState {
    pub(crate) fn new(initial_messages: Vec<Message>) -> Self {
        Self {
            is_running: AtomicBool::new(false),
            is_speaking: Arc::new(AtomicBool::new(false)),
            messages: Mutex::new(initial_messages),
            metrics: Mutex::new(AgentMetrics::default()),
        }
    }
}

/// A filler synthesis in flight, cancellable independently of the turn.
struct FillerTask {
    _handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Orchestrates one conversation session.
pub(crate) struct Coordinator {
    config: AgentConfig,
    events: Option<EventCallback>,
    shared: Arc<SharedState>,

    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    session_cancel: CancellationToken,
    turn_cancel: CancellationToken,
    /// AI-turn generation counter; bumped whenever the turn token is
    /// replaced.
    turn_id: u64,

    // Actor wiring, populated at session start.
    stt_audio_tx: Option<mpsc::UnboundedSender<Bytes>>,
    vad_audio_tx: Option<mpsc::UnboundedSender<Bytes>>,
    turn_input_tx: Option<mpsc::UnboundedSender<TurnDetectorInput>>,
    streamer_tx: Option<mpsc::UnboundedSender<Bytes>>,
    audio_out_tx: Option<mpsc::Sender<Bytes>>,
    actor_handles: Vec<JoinHandle<()>>,
    llm_task: Option<JoinHandle<()>>,
    tts_task: Option<JoinHandle<()>>,
    filler: Option<FillerTask>,

    vad_source: SignalSource,
    turn_source: SignalSource,

    // Machine context.
    listening: ListeningState,
    partial_transcript: String,
    current_response: String,
    sentence_queue: VecDeque<String>,
    pending_tts: usize,
    human_turn_active: bool,
    ai_turn_active: bool,
    ai_turn_had_audio: bool,
    llm_done: bool,
    speech_started_at: Option<u64>,
    metrics: AgentMetrics,

    // Silence prompting.
    silence_deadline: Option<tokio::time::Instant>,
    prompts_used: u32,
    heard_speech: bool,

    stopped: bool,
}

impl Coordinator {
    pub(crate) fn new(
        config: AgentConfig,
        shared: Arc<SharedState>,
        internal_tx: mpsc::UnboundedSender<InternalEvent>,
        internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
        audio_out_tx: mpsc::Sender<Bytes>,
        session_cancel: CancellationToken,
    ) -> Self {
        let vad_source = if config.vad.is_some() {
            SignalSource::Adapter
        } else {
            SignalSource::Stt
        };
        let turn_source = if config.turn_detector.is_some() {
            SignalSource::Adapter
        } else {
            SignalSource::Stt
        };
        let events = config.on_event.clone();

        Self {
            config,
            events,
            shared,
            internal_tx,
            internal_rx,
            session_cancel,
            turn_cancel: CancellationToken::new(),
            turn_id: 0,
            stt_audio_tx: None,
            vad_audio_tx: None,
            turn_input_tx: None,
            streamer_tx: None,
            audio_out_tx: Some(audio_out_tx),
            actor_handles: Vec::new(),
            llm_task: None,
            tts_task: None,
            filler: None,
            vad_source,
            turn_source,
            listening: ListeningState::Idle,
            partial_transcript: String::new(),
            current_response: String::new(),
            sentence_queue: VecDeque::new(),
            pending_tts: 0,
            human_turn_active: false,
            ai_turn_active: false,
            ai_turn_had_audio: false,
            llm_done: false,
            speech_started_at: None,
            metrics: AgentMetrics::default(),
            silence_deadline: None,
            prompts_used: 0,
            heard_speech: false,
            stopped: false,
        }
    }

    /// Run the session until stopped. Consumes the coordinator.
    pub(crate) async fn run(mut self) {
        self.start_session();

        loop {
            let cancel = self.session_cancel.clone();
            let deadline = self.silence_deadline;
            let sleep_target = deadline
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));
            tokio::select! {
                () = cancel.cancelled() => break,
                maybe = self.internal_rx.recv() => {
                    match maybe {
                        Some(event) => {
                            let stop = self.dispatch(event);
                            self.sync_shared();
                            if stop {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                () = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                    self.on_silence_timeout();
                    self.sync_shared();
                }
            }
        }

        self.shutdown().await;
    }

    fn start_session(&mut self) {
        info!(
            "starting voice agent session (vad: {:?}, turn: {:?})",
            self.vad_source, self.turn_source
        );
        self.metrics.session.session_started_at = Some(now_ms());
        self.shared.is_running.store(true, Ordering::Release);

        let (stt_handle, stt_audio_tx) = spawn_stt_actor(
            Arc::clone(&self.config.stt),
            self.internal_tx.clone(),
            self.session_cancel.clone(),
        );
        self.actor_handles.push(stt_handle);
        self.stt_audio_tx = Some(stt_audio_tx);

        if let Some(vad) = self.config.vad.clone() {
            let (handle, audio_tx) = spawn_vad_actor(
                vad,
                self.internal_tx.clone(),
                self.session_cancel.clone(),
            );
            self.actor_handles.push(handle);
            self.vad_audio_tx = Some(audio_tx);
        }

        if let Some(detector) = self.config.turn_detector.clone() {
            let (handle, input_tx) = spawn_turn_detector_actor(
                detector,
                self.internal_tx.clone(),
                self.session_cancel.clone(),
            );
            self.actor_handles.push(handle);
            self.turn_input_tx = Some(input_tx);
        }

        if let Some(out_tx) = self.audio_out_tx.take() {
            let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
            let cancel = self.session_cancel.clone();
            let debug_mode = self.config.debug;
            self.actor_handles.push(tokio::spawn(async move {
                let _ = run_streamer(chunk_rx, out_tx, cancel, debug_mode).await;
            }));
            self.streamer_tx = Some(chunk_tx);
        }

        self.emit(AgentEventKind::AgentStarted);
        if self.config.silence.start_mode == SilenceStartMode::Always {
            self.rearm_silence();
        }
        self.sync_shared();
    }

    /// Handle one internal event. Returns true when the session should
    /// stop.
    fn dispatch(&mut self, event: InternalEvent) -> bool {
        match event {
            InternalEvent::Stop => return true,
            InternalEvent::AudioInput(bytes) => self.on_audio_input(bytes),
            InternalEvent::Stt(event) => self.on_stt(event),
            InternalEvent::Vad(event) => self.on_vad(event),
            InternalEvent::Turn(event) => self.on_turn(event),
            InternalEvent::Llm { turn_id, event } => self.on_llm(turn_id, event),
            InternalEvent::Tts {
                turn_id,
                kind,
                event,
            } => self.on_tts(turn_id, kind, event),
            InternalEvent::Filler(event) => self.on_filler(event),
        }
        false
    }

    fn on_audio_input(&mut self, bytes: Bytes) {
        if let Some(vad_tx) = &self.vad_audio_tx {
            let _ = vad_tx.send(bytes.clone());
        }
        if let Some(stt_tx) = &self.stt_audio_tx {
            let _ = stt_tx.send(bytes);
        }
    }

    // -- Listening region --

    fn on_vad(&mut self, event: VadEvent) {
        match event {
            VadEvent::SpeechStart { at_ms } => {
                self.heard_speech = true;
                self.prompts_used = 0;

                // Barge-in: a VAD speech start while the agent is audible.
                // The duration gate applies when an earlier STT speech
                // start stamped the onset; a bare adapter signal is
                // trusted outright.
                if self.config.interruption.enabled
                    && self.is_speaking()
                    && self
                        .speech_started_at
                        .is_none_or(|t| at_ms.saturating_sub(t)
                            >= self.config.interruption.min_duration_ms)
                {
                    self.interrupt_ai_turn();
                }

                self.listening = ListeningState::UserSpeaking;
                if self.speech_started_at.is_none() {
                    self.speech_started_at = Some(at_ms);
                }
                self.begin_human_turn();
            }
            VadEvent::SpeechEnd { duration_ms, at_ms } => {
                let _ = at_ms;
                if self.listening == ListeningState::UserSpeaking {
                    self.metrics.turn.human_speech_duration_ms += duration_ms;
                    self.forward_speech_end(duration_ms);
                    self.listening = ListeningState::Idle;
                    self.speech_started_at = None;
                }
                self.rearm_silence();
            }
            VadEvent::Probability { value, .. } => {
                if self.config.debug {
                    self.emit(AgentEventKind::VadProbability { value });
                }
            }
            VadEvent::Error { message, .. } => {
                self.provider_error(ErrorSource::Vad, message);
            }
        }
    }

    fn on_stt(&mut self, event: SttEvent) {
        match event {
            SttEvent::Transcript {
                text,
                is_final,
                at_ms,
            } => self.on_transcript(text, is_final, at_ms),
            SttEvent::SpeechStart { at_ms } => {
                self.heard_speech = true;
                self.prompts_used = 0;
                self.listening = ListeningState::UserSpeaking;
                self.speech_started_at = Some(at_ms);
                self.clear_silence();
            }
            SttEvent::SpeechEnd { at_ms } => {
                if self.listening == ListeningState::UserSpeaking {
                    let duration_ms = self
                        .speech_started_at
                        .map(|t| at_ms.saturating_sub(t))
                        .unwrap_or(0);
                    self.metrics.turn.human_speech_duration_ms += duration_ms;
                    self.forward_speech_end(duration_ms);
                    self.listening = ListeningState::Idle;
                    self.speech_started_at = None;
                }
                self.rearm_silence();
            }
            SttEvent::Error { message, .. } => {
                // STT errors are non-fatal; the session keeps running.
                self.provider_error(ErrorSource::Stt, message);
            }
        }
    }

    // -- Transcribing region --

    fn on_transcript(&mut self, text: String, is_final: bool, at_ms: u64) {
        // STT-sourced barge-in: a hypothesis arriving after sustained
        // speech while the agent is audible. Requires a speech-start
        // stamp so stray noise without an onset cannot interrupt.
        if self.vad_source == SignalSource::Stt
            && self.config.interruption.enabled
            && self.is_speaking()
            && self
                .speech_started_at
                .is_some_and(|t| at_ms.saturating_sub(t)
                    >= self.config.interruption.min_duration_ms)
        {
            self.interrupt_ai_turn();
        }

        self.heard_speech = true;
        self.prompts_used = 0;
        self.begin_human_turn();
        self.partial_transcript = text.clone();
        self.clear_silence();

        self.emit(AgentEventKind::HumanTurnTranscript {
            text: text.clone(),
            is_final,
        });
        if let Some(turn_tx) = &self.turn_input_tx {
            let _ = turn_tx.send(TurnDetectorInput::Transcript {
                text: text.clone(),
                is_final,
            });
        }

        // A final transcript ends the turn only when no turn detector is
        // configured; otherwise the detector owns the boundary.
        if is_final && self.turn_source == SignalSource::Stt {
            self.close_human_turn(&text);
            if self.ai_turn_active {
                self.interrupt_ai_turn();
            }
            self.start_ai_turn_with_llm();
        }
    }

    // -- Turn detection --

    fn on_turn(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::TurnEnd { transcript, .. } => {
                if self.ai_turn_active {
                    self.interrupt_ai_turn();
                }
                self.close_human_turn(&transcript);
                self.start_ai_turn_with_llm();
            }
            TurnEvent::TurnAbandoned { reason, .. } => {
                debug!(
                    "human turn abandoned: {reason} (partial transcript: {:?})",
                    self.partial_transcript
                );
                self.emit(AgentEventKind::HumanTurnAbandoned { reason });
                self.metrics.session.abandoned_turns += 1;
                self.human_turn_active = false;
                self.partial_transcript.clear();
                self.listening = ListeningState::Idle;
                self.speech_started_at = None;
                self.metrics.turn.reset_human_turn();
                self.rearm_silence();
            }
            TurnEvent::Error { message, .. } => {
                self.provider_error(ErrorSource::TurnDetector, message);
            }
        }
    }

    // -- Responding region --

    fn on_llm(&mut self, turn_id: u64, event: LlmEvent) {
        if turn_id != self.turn_id {
            return;
        }
        match event {
            LlmEvent::Token { text, at_ms } => {
                if self.metrics.turn.first_token_at.is_none() {
                    self.metrics.turn.first_token_at = Some(at_ms);
                }
                self.metrics.turn.token_count += 1;
                self.metrics.turn.character_count += text.chars().count() as u64;
                self.current_response.push_str(&text);
                self.emit(AgentEventKind::AiTurnToken { token: text });
            }
            LlmEvent::Sentence { text, index, at_ms } => {
                if self.metrics.turn.first_sentence_at.is_none() {
                    self.metrics.turn.first_sentence_at = Some(at_ms);
                }
                self.metrics.turn.sentence_count += 1;
                self.emit(AgentEventKind::AiTurnSentence {
                    sentence: text.clone(),
                    index,
                });
                self.sentence_queue.push_back(text);
                self.pending_tts += 1;
                if self.tts_task.is_none() {
                    self.spawn_next_tts();
                }
                self.set_speaking(true);
            }
            LlmEvent::Complete { full_text, at_ms } => {
                self.llm_task = None;
                self.llm_done = true;
                self.current_response = full_text.clone();
                if !full_text.trim().is_empty() {
                    self.push_message(Message::assistant(full_text));
                }
                self.maybe_finish_ai_turn(at_ms);
            }
            LlmEvent::Error { message, at_ms } => {
                let _ = at_ms;
                self.llm_task = None;
                self.provider_error(ErrorSource::Llm, message);
                if self.ai_turn_active {
                    // Interruption-like reset, minus a new human turn.
                    self.interrupt_ai_turn();
                }
            }
        }
    }

    // -- Streaming region --

    fn on_tts(&mut self, turn_id: u64, kind: TtsKind, event: TtsEvent) {
        if turn_id != self.turn_id {
            return;
        }
        match event {
            TtsEvent::Chunk { bytes, at_ms } => {
                if !self.is_speaking() {
                    return;
                }
                self.ai_turn_had_audio = true;
                if self.metrics.turn.first_audio_at.is_none() {
                    self.metrics.turn.first_audio_at = Some(at_ms);
                }
                self.metrics.turn.chunk_count += 1;
                self.metrics.turn.byte_count += bytes.len() as u64;
                self.emit(AgentEventKind::AiTurnAudio {
                    bytes: bytes.clone(),
                });
                if let Some(streamer) = &self.streamer_tx {
                    let _ = streamer.send(bytes);
                }
            }
            TtsEvent::Complete { at_ms } => {
                self.finish_tts(kind, at_ms);
            }
            TtsEvent::Error { message, at_ms } => {
                self.provider_error(ErrorSource::Tts, message);
                self.finish_tts(kind, at_ms);
            }
        }
    }

    /// Shared tail of `tts:complete` and `tts:error`: advance the queue
    /// or wind the turn down.
    fn finish_tts(&mut self, kind: TtsKind, at_ms: u64) {
        match kind {
            TtsKind::Queue => {
                self.tts_task = None;
                self.pending_tts = self.pending_tts.saturating_sub(1);
                if !self.sentence_queue.is_empty() {
                    self.spawn_next_tts();
                    return;
                }
                if !self.maybe_finish_ai_turn(at_ms) && self.filler.is_none() {
                    // LLM still generating; nothing audible right now.
                    self.set_speaking(false);
                }
            }
            TtsKind::Filler => {
                self.filler = None;
                if !self.maybe_finish_ai_turn(at_ms)
                    && self.pending_tts == 0
                    && self.tts_task.is_none()
                {
                    self.set_speaking(false);
                }
            }
        }
    }

    fn on_filler(&mut self, event: FillerEvent) {
        match event {
            FillerEvent::Say { text } => {
                if !self.ai_turn_active {
                    debug!("ignoring filler say outside an AI turn");
                    return;
                }
                // A newer filler replaces a running one.
                if let Some(old) = self.filler.take() {
                    old.cancel.cancel();
                }
                let cancel = self.turn_cancel.child_token();
                let handle = spawn_tts_actor(
                    Arc::clone(&self.config.tts),
                    text,
                    self.internal_tx.clone(),
                    cancel.clone(),
                    self.config.timeout.tts_ms,
                    self.turn_id,
                    TtsKind::Filler,
                );
                self.filler = Some(FillerTask {
                    _handle: handle,
                    cancel,
                });
                self.set_speaking(true);
            }
            FillerEvent::Interrupt => {
                if let Some(filler) = self.filler.take() {
                    filler.cancel.cancel();
                }
                if self.pending_tts == 0 && self.tts_task.is_none() {
                    self.set_speaking(false);
                }
            }
        }
    }

    fn on_silence_timeout(&mut self) {
        self.silence_deadline = None;
        if self.ai_turn_active || self.human_turn_active || self.is_speaking() {
            return;
        }
        if self.prompts_used >= self.config.silence.max_prompts {
            return;
        }
        self.prompts_used += 1;
        let prompt = self.config.silence.prompt_message.clone();
        info!(
            "silence timeout; prompting ({}/{})",
            self.prompts_used, self.config.silence.max_prompts
        );
        self.start_prompt_turn(prompt);
    }

    // -- Turn lifecycle helpers --

    /// Emit `human-turn:started` lazily: the first speech start or
    /// transcript of a turn begins it, whichever arrives first.
    fn begin_human_turn(&mut self) {
        if self.human_turn_active {
            return;
        }
        self.human_turn_active = true;
        self.metrics.turn.reset_human_turn();
        self.metrics.turn.human_turn_started_at = Some(now_ms());
        self.clear_silence();
        self.emit(AgentEventKind::HumanTurnStarted);
    }

    fn close_human_turn(&mut self, transcript: &str) {
        self.begin_human_turn();
        self.metrics.turn.human_turn_ended_at = Some(now_ms());
        self.metrics.turn.human_transcript_length = transcript.chars().count() as u64;
        self.emit(AgentEventKind::HumanTurnEnded {
            transcript: transcript.to_owned(),
            metrics: self.metrics.turn.human_report(),
        });
        if !transcript.trim().is_empty() {
            self.push_message(Message::user(transcript));
        }
        self.human_turn_active = false;
        self.partial_transcript.clear();
        self.listening = ListeningState::Idle;
        self.speech_started_at = None;
    }

    fn start_ai_turn_with_llm(&mut self) {
        self.begin_ai_turn(false);
        let messages = self.messages_snapshot();
        self.llm_task = Some(spawn_llm_actor(
            self.config.llm.clone(),
            messages,
            self.internal_tx.clone(),
            self.turn_cancel.clone(),
            self.config.timeout.llm_ms,
            self.turn_id,
            Arc::clone(&self.shared.is_speaking),
        ));
    }

    /// A spoken prompt turn with no LLM behind it (silence prompting).
    fn start_prompt_turn(&mut self, prompt: String) {
        self.begin_ai_turn(true);
        self.current_response = prompt.clone();
        self.push_message(Message::assistant(prompt.clone()));
        self.metrics.turn.first_sentence_at = Some(now_ms());
        self.metrics.turn.sentence_count = 1;
        self.emit(AgentEventKind::AiTurnSentence {
            sentence: prompt.clone(),
            index: 0,
        });
        self.sentence_queue.push_back(prompt);
        self.pending_tts = 1;
        self.spawn_next_tts();
        self.set_speaking(true);
    }

    fn begin_ai_turn(&mut self, llm_done: bool) {
        self.ai_turn_active = true;
        self.llm_done = llm_done;
        self.ai_turn_had_audio = false;
        self.current_response.clear();
        self.metrics.turn.reset_ai_turn();
        self.metrics.turn.ai_turn_started_at = Some(now_ms());
        self.metrics.session.total_turns += 1;
        self.clear_silence();
        self.emit(AgentEventKind::AiTurnStarted);
    }

    /// The single interruption routine shared by barge-in, turn
    /// preemption, LLM errors, and stop: report the cut, abort the turn
    /// scope, and reset every turn-local field.
    fn interrupt_ai_turn(&mut self) {
        if !self.ai_turn_active {
            return;
        }
        self.emit(AgentEventKind::AiTurnInterrupted {
            partial_text: self.current_response.clone(),
            metrics: self.metrics.turn.ai_report(now_ms()),
        });
        self.metrics.session.interrupted_turns += 1;

        self.turn_cancel.cancel();
        self.turn_cancel = CancellationToken::new();
        self.turn_id += 1;

        self.llm_task = None;
        self.tts_task = None;
        if let Some(filler) = self.filler.take() {
            filler.cancel.cancel();
        }
        self.sentence_queue.clear();
        self.pending_tts = 0;

        self.set_speaking(false);
        self.ai_turn_active = false;
        self.ai_turn_had_audio = false;
        self.llm_done = false;
        self.current_response.clear();
        self.metrics.turn.reset_ai_turn();
        self.rearm_silence();
    }

    /// Close the AI turn once the LLM has completed and no synthesis
    /// remains. Covers both the spoken and the silent-response endings.
    fn maybe_finish_ai_turn(&mut self, ended_at: u64) -> bool {
        if !(self.ai_turn_active
            && self.llm_done
            && self.tts_task.is_none()
            && self.filler.is_none()
            && self.sentence_queue.is_empty())
        {
            return false;
        }
        self.set_speaking(false);
        self.emit(AgentEventKind::AiTurnEnded {
            text: self.current_response.clone(),
            was_spoken: self.ai_turn_had_audio,
            metrics: self.metrics.turn.ai_report(ended_at),
        });
        self.metrics.session.completed_turns += 1;

        self.ai_turn_active = false;
        self.ai_turn_had_audio = false;
        self.llm_done = false;
        self.pending_tts = 0;
        self.current_response.clear();
        self.metrics.turn.reset_ai_turn();
        self.rearm_silence();
        true
    }

    fn spawn_next_tts(&mut self) {
        let Some(text) = self.sentence_queue.pop_front() else {
            return;
        };
        // A real sentence takes precedence over a running filler.
        if let Some(filler) = self.filler.take() {
            filler.cancel.cancel();
        }
        self.tts_task = Some(spawn_tts_actor(
            Arc::clone(&self.config.tts),
            text,
            self.internal_tx.clone(),
            self.turn_cancel.clone(),
            self.config.timeout.tts_ms,
            self.turn_id,
            TtsKind::Queue,
        ));
        self.set_speaking(true);
    }

    // -- Small shared helpers --

    fn forward_speech_end(&mut self, duration_ms: u64) {
        if let Some(turn_tx) = &self.turn_input_tx {
            let _ = turn_tx.send(TurnDetectorInput::SpeechEnd { duration_ms });
        }
    }

    fn provider_error(&mut self, source: ErrorSource, message: String) {
        warn!("{source} provider error: {message}");
        self.metrics.session.record_error(source);
        self.emit(AgentEventKind::AgentError { source, message });
    }

    fn push_message(&self, message: Message) {
        let mut messages = self
            .shared
            .messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        push_bounded(&mut messages, message, self.config.max_messages);
    }

    fn messages_snapshot(&self) -> Vec<Message> {
        self.shared
            .messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn is_speaking(&self) -> bool {
        self.shared.is_speaking.load(Ordering::Acquire)
    }

    fn set_speaking(&self, speaking: bool) {
        self.shared.is_speaking.store(speaking, Ordering::Release);
    }

    fn emit(&self, kind: AgentEventKind) {
        if let Some(callback) = &self.events {
            callback(AgentEvent::now(kind));
        }
    }

    fn sync_shared(&self) {
        let mut metrics = self
            .shared
            .metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *metrics = self.metrics.clone();
    }

    // -- Silence timer --

    fn rearm_silence(&mut self) {
        let silence = &self.config.silence;
        if !silence.enabled
            || self.ai_turn_active
            || self.human_turn_active
            || self.prompts_used >= silence.max_prompts
            || (silence.start_mode == SilenceStartMode::AfterFirstSpeech && !self.heard_speech)
        {
            self.silence_deadline = None;
            return;
        }
        self.silence_deadline =
            Some(tokio::time::Instant::now() + Duration::from_millis(silence.timeout_ms));
    }

    fn clear_silence(&mut self) {
        self.silence_deadline = None;
    }

    // -- Teardown --

    async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("voice agent session shutting down");

        if self.ai_turn_active {
            self.interrupt_ai_turn();
        }
        self.turn_cancel.cancel();
        self.session_cancel.cancel();

        // Closing the forwarding channels lets actor loops drain out even
        // before they observe the token.
        self.stt_audio_tx = None;
        self.vad_audio_tx = None;
        self.turn_input_tx = None;
        self.streamer_tx = None;
        self.llm_task = None;
        self.tts_task = None;
        self.filler = None;

        for handle in self.actor_handles.drain(..) {
            let _ = handle.await;
        }

        self.emit(AgentEventKind::AgentStopped);
        self.shared.is_running.store(false, Ordering::Release);
        self.set_speaking(false);
        self.sync_shared();
        info!("voice agent session stopped");
    }
}
