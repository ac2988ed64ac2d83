// crates/evalpack-listener/tests/listener_scenarios.rs
// ============================================================================
// Module: Evalpack Listener Scenario Tests
// Description: Cross-crate end-to-end scenarios spanning evalpack-core,
//              evalpack-dispatch, and evalpack-listener.
// Purpose: Exercise message-driven auto-dispatch and idle-session eviction
//          the way a real caller wires the listener to a bus and a pack
//          loader.
// Dependencies: evalpack-core, evalpack-dispatch (test-utils), evalpack-listener
// ============================================================================

//! ## Overview
//! Validates that the listener fires a turn dispatch for an assistant
//! message but not a user message, and that the accumulator's TTL sweep
//! evicts only sessions idle past the cutoff.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use evalpack_core::CancelSignal;
use evalpack_core::EvalContext;
use evalpack_core::EvalDef;
use evalpack_core::EvalId;
use evalpack_core::EvalResult;
use evalpack_core::PromptId;
use evalpack_core::SessionId;
use evalpack_core::Trigger;
use evalpack_dispatch::DispatchError;
use evalpack_dispatch::Dispatcher;
use evalpack_dispatch::InMemoryBus;
use evalpack_dispatch::Publisher;
use evalpack_listener::EventBusEvalListener;
use evalpack_listener::LoaderError;
use evalpack_listener::MESSAGE_CREATED_SUBJECT;
use evalpack_listener::MessageCreatedEvent;
use evalpack_listener::MessageData;
use evalpack_listener::PackEvalLoader;
use evalpack_listener::SessionAccumulator;

struct RecordingDispatcher {
    turn_calls: Mutex<Vec<SessionId>>,
}

impl RecordingDispatcher {
    fn new() -> Self {
        Self {
            turn_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch_turn(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        self.turn_calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(session_id.clone());
        Ok(Vec::new())
    }

    async fn dispatch_session(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, _session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        Ok(Vec::new())
    }

    async fn dispatch_conversation(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, _session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        Ok(Vec::new())
    }
}

struct StubLoader;

#[async_trait]
impl PackEvalLoader for StubLoader {
    async fn load_evals(&self, _prompt_id: &PromptId) -> Result<Vec<EvalDef>, LoaderError> {
        Ok(vec![EvalDef {
            id: EvalId::new("q"),
            eval_type: "quality_check".to_string(),
            trigger: Trigger::EveryTurn,
            params: BTreeMap::new(),
            enabled: true,
            sample_percentage: 5.0,
            metric: None,
            threshold: None,
            when: None,
            description: None,
            message: None,
        }])
    }
}

fn message_created(session_id: &str, role: &str, content: &str) -> Vec<u8> {
    serde_json::to_vec(&MessageCreatedEvent {
        event_type: "message_created".to_string(),
        session_id: session_id.to_string(),
        data: MessageData {
            role: role.to_string(),
            content: content.to_string(),
        },
    })
    .expect("event should serialize")
}

/// S3 — An assistant message auto-fires a turn dispatch through the full
/// bus-to-listener-to-dispatcher path; a user message does not.
#[tokio::test]
async fn assistant_message_auto_fires_turn_dispatch_end_to_end() {
    let bus = Arc::new(InMemoryBus::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let listener = Arc::new(EventBusEvalListener::new(bus.clone(), dispatcher.clone(), Arc::new(StubLoader)));

    listener.accumulator().add_message(&SessionId::new("s1"), Some(&PromptId::new("p1")), "user", "hi");

    let listener_task = listener.clone();
    tokio::spawn(async move {
        let _ = listener_task.start().await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    bus.publish(MESSAGE_CREATED_SUBJECT, message_created("s1", "assistant", "hello there"))
        .await
        .expect("publish should succeed");
    tokio::time::sleep(Duration::from_millis(30)).await;

    bus.publish(MESSAGE_CREATED_SUBJECT, message_created("s1", "user", "one more thing"))
        .await
        .expect("publish should succeed");
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(dispatcher.turn_calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len(), 1);
    listener.close();
}

/// S6 — TTL cleanup evicts only the session idle past the cutoff; a
/// recently active session is retained.
#[test]
fn ttl_cleanup_evicts_only_stale_sessions() {
    let accumulator = SessionAccumulator::new();

    let old_session = SessionId::new("old");
    let recent_session = SessionId::new("recent");
    accumulator.add_message(&old_session, Some(&PromptId::new("p1")), "user", "long ago");
    accumulator.add_message(&recent_session, Some(&PromptId::new("p1")), "user", "just now");

    let cutoff = Instant::now();
    std::thread::sleep(Duration::from_millis(20));
    accumulator.add_message(&recent_session, None, "assistant", "still talking");

    let removed = accumulator.cleanup_before(cutoff);

    assert_eq!(removed, 1);
    assert!(accumulator.prompt_id(&old_session).is_none());
    assert!(accumulator.prompt_id(&recent_session).is_some());
}
