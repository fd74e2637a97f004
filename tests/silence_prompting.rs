//! Silence prompting: the agent speaks up when the conversation stalls.

mod common;

use common::{EventLog, MockStt, ScriptedTts};
use futures_util::FutureExt;
use parlance::{
    Agent, AgentConfig, AgentEventKind, LlmProvider, SilenceConfig, SilenceStartMode,
};
use std::time::Duration;

fn quick_llm() -> LlmProvider {
    LlmProvider::from_fn(|_messages, ctx| {
        async move {
            ctx.sentence("Sure.", 0);
            ctx.complete("Sure.");
            Ok(())
        }
        .boxed()
    })
}

fn silence(timeout_ms: u64, start_mode: SilenceStartMode, max_prompts: u32) -> SilenceConfig {
    SilenceConfig {
        enabled: true,
        timeout_ms,
        start_mode,
        prompt_message: "Are you still there?".to_owned(),
        max_prompts,
    }
}

#[tokio::test]
async fn idle_session_prompts_up_to_the_limit() {
    let stt = MockStt::new();
    let tts = ScriptedTts::new(vec![&[0x0E]]);
    let events = EventLog::new();

    let config = AgentConfig::new(stt.clone(), quick_llm(), tts.clone())
        .with_silence(silence(150, SilenceStartMode::Always, 2))
        .on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");

    agent.start();
    events.wait_for_count("ai-turn:ended", 2).await;

    // Two prompts, then the timer stays disarmed.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(events.count("ai-turn:started"), 2);
    let prompts = events
        .kinds()
        .iter()
        .filter(|k| matches!(
            k,
            AgentEventKind::AiTurnSentence { sentence, .. } if sentence == "Are you still there?"
        ))
        .count();
    assert_eq!(prompts, 2);
    assert_eq!(agent.snapshot().metrics.session.total_turns, 2);

    // Prompt turns are spoken, interruptible AI turns.
    let kinds = events.kinds();
    assert!(kinds.iter().any(|k| matches!(
        k,
        AgentEventKind::AiTurnEnded { text, was_spoken: true, .. } if text == "Are you still there?"
    )));

    agent.stop().await;
}

#[tokio::test]
async fn after_first_speech_mode_waits_for_the_user() {
    let stt = MockStt::new();
    let tts = ScriptedTts::new(vec![&[0x0F]]);
    let events = EventLog::new();

    let config = AgentConfig::new(stt.clone(), quick_llm(), tts)
        .with_silence(silence(150, SilenceStartMode::AfterFirstSpeech, 1))
        .on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");

    agent.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(events.count("ai-turn:started"), 0);

    // One exchange arms the timer; the next stall prompts.
    stt.context().await.transcript("hello", true);
    events.wait_for("ai-turn:ended").await;
    events.wait_for_count("ai-turn:ended", 2).await;

    let prompts = events
        .kinds()
        .iter()
        .filter(|k| matches!(
            k,
            AgentEventKind::AiTurnSentence { sentence, .. } if sentence == "Are you still there?"
        ))
        .count();
    assert_eq!(prompts, 1);

    agent.stop().await;
}

#[tokio::test]
async fn user_speech_resets_the_prompt_budget() {
    let stt = MockStt::new();
    let tts = ScriptedTts::new(vec![&[0x10]]);
    let events = EventLog::new();

    let config = AgentConfig::new(stt.clone(), quick_llm(), tts)
        .with_silence(silence(150, SilenceStartMode::Always, 1))
        .on_event(events.recorder());
    let agent = Agent::new(config).expect("agent");

    agent.start();
    // First stall: one prompt, budget exhausted.
    events.wait_for("ai-turn:ended").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(events.count("ai-turn:started"), 1);

    // The user speaking restores the budget; the next stall prompts again.
    stt.context().await.transcript("sorry, here", true);
    events.wait_for_count("ai-turn:ended", 2).await;
    events.wait_for_count("ai-turn:ended", 3).await;

    let prompts = events
        .kinds()
        .iter()
        .filter(|k| matches!(
            k,
            AgentEventKind::AiTurnSentence { sentence, .. } if sentence == "Are you still there?"
        ))
        .count();
    assert_eq!(prompts, 2);

    agent.stop().await;
}
