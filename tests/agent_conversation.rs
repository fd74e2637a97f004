//! End-to-end conversation flows with scripted providers.

mod common;

use common::{EventLog, MockStt, ScriptedTts, wait_until};
use futures_util::FutureExt;
use parlance::{Agent, AgentConfig, AgentEventKind, LlmProvider, Role};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn golden_llm() -> LlmProvider {
    LlmProvider::from_fn(|_messages, ctx| {
        async move {
            ctx.token("Hi");
            ctx.sentence("Hi there.", 0);
            ctx.complete("Hi there.");
            Ok(())
        }
        .boxed()
    })
}

#[tokio::test]
async fn golden_path_emits_the_full_ordered_sequence() {
    common::init_tracing();
    let stt = MockStt::new();
    let tts = ScriptedTts::new(vec![&[0x07, 0x07, 0x07, 0x07]]);
    let events = EventLog::new();

    let config = AgentConfig::new(stt.clone(), golden_llm(), tts.clone())
        .on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");
    let mut audio = agent.audio_stream().expect("audio stream");

    agent.start();
    let stt_ctx = stt.context().await;
    stt_ctx.transcript("hello", false);
    stt_ctx.transcript("hello", true);

    events.wait_for("ai-turn:ended").await;
    agent.stop().await;

    assert_eq!(
        events.names(),
        vec![
            "agent:started",
            "human-turn:started",
            "human-turn:transcript",
            "human-turn:transcript",
            "human-turn:ended",
            "ai-turn:started",
            "ai-turn:token",
            "ai-turn:sentence",
            "ai-turn:audio",
            "ai-turn:ended",
            "agent:stopped",
        ]
    );

    // Spot-check the payloads along the way.
    let kinds = events.kinds();
    assert!(matches!(
        &kinds[4],
        AgentEventKind::HumanTurnEnded { transcript, .. } if transcript == "hello"
    ));
    assert!(matches!(
        &kinds[9],
        AgentEventKind::AiTurnEnded { text, was_spoken: true, .. } if text == "Hi there."
    ));

    let chunk = audio.recv().await.expect("synthesized chunk");
    assert_eq!(chunk.as_ref(), &[0x07, 0x07, 0x07, 0x07]);

    let snapshot = agent.snapshot();
    assert!(!snapshot.is_running);
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].role, Role::User);
    assert_eq!(snapshot.messages[0].content, "hello");
    assert_eq!(snapshot.messages[1].role, Role::Assistant);
    assert_eq!(snapshot.messages[1].content, "Hi there.");
    assert_eq!(snapshot.metrics.session.completed_turns, 1);
}

#[tokio::test]
async fn silent_llm_response_ends_the_turn_unspoken() {
    let stt = MockStt::new();
    let tts = ScriptedTts::new(vec![&[0x01]]);
    let events = EventLog::new();

    let llm = LlmProvider::from_fn(|_messages, ctx| {
        async move {
            ctx.complete("Understood.");
            Ok(())
        }
        .boxed()
    });

    let config = AgentConfig::new(stt.clone(), llm, tts.clone()).on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");

    agent.start();
    stt.context().await.transcript("noted", true);
    events.wait_for("ai-turn:ended").await;

    let kinds = events.kinds();
    let ended = kinds
        .iter()
        .find(|k| matches!(k, AgentEventKind::AiTurnEnded { .. }))
        .expect("ended event");
    assert!(matches!(
        ended,
        AgentEventKind::AiTurnEnded { was_spoken: false, .. }
    ));
    assert!(tts.synthesized_texts().is_empty());

    agent.stop().await;
}

#[tokio::test]
async fn tts_error_mid_queue_continues_with_next_sentence() {
    let stt = MockStt::new();
    let tts = ScriptedTts::failing_on(vec![&[0x02, 0x02]], "First sentence.");
    let events = EventLog::new();

    let llm = LlmProvider::from_fn(|_messages, ctx| {
        async move {
            ctx.sentence("First sentence.", 0);
            ctx.sentence("Second sentence.", 1);
            ctx.complete("First sentence. Second sentence.");
            Ok(())
        }
        .boxed()
    });

    let config = AgentConfig::new(stt.clone(), llm, tts.clone()).on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");

    agent.start();
    stt.context().await.transcript("go", true);
    events.wait_for("ai-turn:ended").await;
    agent.stop().await;

    assert_eq!(events.count("agent:error"), 1);
    let kinds = events.kinds();
    assert!(kinds.iter().any(|k| matches!(
        k,
        AgentEventKind::AgentError { source, .. } if *source == parlance::ErrorSource::Tts
    )));
    assert_eq!(
        tts.synthesized_texts(),
        vec!["First sentence.".to_owned(), "Second sentence.".to_owned()]
    );
    // The error event lands before the turn closes.
    let error_pos = events.names().iter().position(|n| *n == "agent:error");
    let ended_pos = events.names().iter().position(|n| *n == "ai-turn:ended");
    assert!(error_pos < ended_pos);
}

#[tokio::test]
async fn duplicate_start_and_stop_emit_single_lifecycle_events() {
    let stt = MockStt::new();
    let tts = ScriptedTts::new(vec![&[0x03]]);
    let events = EventLog::new();

    let config = AgentConfig::new(stt.clone(), golden_llm(), tts).on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");

    agent.start();
    agent.start();
    events.wait_for("agent:started").await;
    agent.stop().await;
    agent.stop().await;

    assert_eq!(events.count("agent:started"), 1);
    assert_eq!(events.count("agent:stopped"), 1);
    assert_eq!(events.names().first(), Some(&"agent:started"));
    assert_eq!(events.names().last(), Some(&"agent:stopped"));
}

#[tokio::test]
async fn audio_sent_outside_running_state_is_never_observed() {
    let stt = MockStt::new();
    let tts = ScriptedTts::new(vec![&[0x04]]);

    let config = AgentConfig::new(stt.clone(), golden_llm(), tts);
    let agent = Agent::new(config).expect("agent");

    // Before start: accepted but dropped.
    agent.send_audio(vec![1i16, 2, 3]).expect("send before start");

    agent.start();
    wait_until(|| stt.started.load(Ordering::SeqCst).then_some(())).await;
    agent.send_audio(vec![5i16, 6]).expect("send while running");
    wait_until(|| (!stt.received_audio().is_empty()).then_some(())).await;

    agent.stop().await;
    agent.send_audio(vec![9i16]).expect("send after stop");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let received = stt.received_audio();
    assert_eq!(received.len(), 1);
    // linear16 little-endian packing of [5, 6].
    assert_eq!(received[0].as_ref(), &[5, 0, 6, 0]);
}

#[tokio::test]
async fn llm_context_reports_speaking_state() {
    let stt = MockStt::new();
    let tts = ScriptedTts::holding_open(vec![&[0x05]]);
    let events = EventLog::new();
    let observed_speaking = Arc::new(AtomicBool::new(false));

    let observed = Arc::clone(&observed_speaking);
    let llm = LlmProvider::from_fn(move |_messages, ctx| {
        let observed = Arc::clone(&observed);
        async move {
            assert!(!ctx.is_speaking());
            ctx.sentence("Hold on.", 0);
            tokio::time::sleep(Duration::from_millis(100)).await;
            observed.store(ctx.is_speaking(), Ordering::SeqCst);
            ctx.complete("Hold on.");
            Ok(())
        }
        .boxed()
    });

    let config = AgentConfig::new(stt.clone(), llm, tts).on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");

    agent.start();
    stt.context().await.transcript("hey", true);
    events.wait_for("ai-turn:sentence").await;
    wait_until(|| observed_speaking.load(Ordering::SeqCst).then_some(())).await;
    assert!(agent.snapshot().is_speaking);

    agent.stop().await;
}
