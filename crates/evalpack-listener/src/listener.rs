// crates/evalpack-listener/src/listener.rs
// ============================================================================
// Module: Evalpack Event-Bus Eval Listener
// Description: Event-driven entry point turning message-created events into
//              eval dispatches.
// Purpose: Subscribe to message lifecycle events, accumulate per-session
//          history, and auto-fire turn/session evals through a Dispatcher.
// Dependencies: evalpack_core, evalpack_dispatch, crate::{accumulator,
//               event, loader}, tokio, tokio_util, tracing
// ============================================================================

//! ## Overview
//! [`EventBusEvalListener`] subscribes to `message_created`, records
//! every message into a [`SessionAccumulator`], and fires one detached
//! background task per assistant message for a turn-eval dispatch, so
//! bus-delivery latency is not coupled to LLM-adjacent work — an
//! intentionally unbounded fire-and-forget. `close_session` runs
//! synchronously in the caller's task,
//! loading definitions through a [`crate::loader::PackEvalLoader`],
//! dispatching session evals, and forwarding results to a configured
//! writer. A single long-lived cleanup task evicts idle sessions on a
//! timer. The listener owns a [`CancellationToken`] lifecycle: `close()`
//! cancels it, which stops the cleanup loop and the subscribe loop, and
//! cooperatively cancels any dispatch still in flight.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use evalpack_core::CancelSignal;
use evalpack_core::EvalResult;
use evalpack_core::PromptId;
use evalpack_core::ResultWriter;
use evalpack_core::SessionId;
use evalpack_dispatch::BusMessage;
use evalpack_dispatch::Dispatcher;
use evalpack_dispatch::MessageHandler;
use evalpack_dispatch::Subscriber;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::accumulator::SessionAccumulator;
use crate::event::MESSAGE_CREATED_SUBJECT;
use crate::event::MessageCreatedEvent;
use crate::loader::PackEvalLoader;

/// Default interval between stale-session sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default idle time before a session is evicted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Errors returned by [`EventBusEvalListener`] operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The `message_created` subscription ended with a fatal transport error.
    #[error("listener subscription failed: {0}")]
    Subscription(String),
    /// `PackEvalLoader::load_evals` failed during `close_session`.
    #[error("failed to load evals while closing session: {0}")]
    Loader(String),
    /// The dispatcher failed during `close_session`.
    #[error("session dispatch failed: {0}")]
    Dispatch(String),
}

// ============================================================================
// SECTION: Listener
// ============================================================================

/// Event-driven entry point turning `message_created` events into eval
/// dispatches.
pub struct EventBusEvalListener<S> {
    subscriber: Arc<S>,
    dispatcher: Arc<dyn Dispatcher>,
    loader: Arc<dyn PackEvalLoader>,
    accumulator: Arc<SessionAccumulator>,
    writer: Option<Arc<dyn ResultWriter>>,
    cleanup_interval: Duration,
    ttl: Duration,
    lifecycle: CancellationToken,
}

impl<S> EventBusEvalListener<S>
where
    S: Subscriber + 'static,
{
    /// Creates a listener subscribing through `subscriber`, dispatching
    /// through `dispatcher`, and loading pack definitions through `loader`.
    #[must_use]
    pub fn new(subscriber: Arc<S>, dispatcher: Arc<dyn Dispatcher>, loader: Arc<dyn PackEvalLoader>) -> Self {
        Self {
            subscriber,
            dispatcher,
            loader,
            accumulator: Arc::new(SessionAccumulator::new()),
            writer: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            ttl: DEFAULT_TTL,
            lifecycle: CancellationToken::new(),
        }
    }

    /// Attaches a result writer used by `close_session` to forward
    /// session-scoped results.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn ResultWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Overrides the stale-session sweep interval.
    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Overrides the idle-session TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Exposes the accumulator for callers that need to seed session state
    /// ahead of the first event (e.g. tests, or a bridge from another
    /// ingestion path).
    #[must_use]
    pub fn accumulator(&self) -> &Arc<SessionAccumulator> {
        &self.accumulator
    }

    /// Cancels the listener's lifecycle: stops the cleanup loop and the
    /// `message_created` subscription, and cooperatively cancels any
    /// turn-eval dispatch still in flight.
    pub fn close(&self) {
        self.lifecycle.cancel();
    }

    /// Runs the subscription loop and the cleanup loop concurrently until
    /// either the subscription ends or [`close`](Self::close) is called.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Subscription`] on a fatal transport error.
    pub async fn start(&self) -> Result<(), ListenerError> {
        let handler = self.message_handler();
        let subscribe = self.subscriber.subscribe(MESSAGE_CREATED_SUBJECT, handler);

        tokio::select! {
            result = subscribe => result.map_err(|err| ListenerError::Subscription(err.to_string())),
            () = self.run_cleanup_loop() => Ok(()),
        }
    }

    fn message_handler(&self) -> MessageHandler {
        let accumulator = self.accumulator.clone();
        let dispatcher = self.dispatcher.clone();
        let loader = self.loader.clone();
        let lifecycle = self.lifecycle.clone();

        Box::new(move |message: BusMessage| {
            let accumulator = accumulator.clone();
            let dispatcher = dispatcher.clone();
            let loader = loader.clone();
            let lifecycle = lifecycle.clone();
            Box::pin(async move {
                handle_message(&message, &accumulator, &dispatcher, &loader, &lifecycle);
            })
        })
    }

    async fn run_cleanup_loop(&self) {
        let mut ticker = tokio::time::interval(self.cleanup_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff = Instant::now().checked_sub(self.ttl).unwrap_or_else(Instant::now);
                    let removed = self.accumulator.cleanup_before(cutoff);
                    if removed > 0 {
                        tracing::debug!(removed, "evicted stale sessions");
                    }
                }
                () = self.lifecycle.cancelled() => break,
            }
        }
    }

    /// Closes `session_id`: loads its eval definitions by prompt id,
    /// dispatches session evals, forwards results to the configured writer,
    /// then removes session state. If no prompt id was ever seeded, the
    /// session is removed without dispatching anything.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Loader`] or [`ListenerError::Dispatch`] on
    /// failure; session state is still removed in either case.
    pub async fn close_session(&self, session_id: &SessionId) -> Result<(), ListenerError> {
        let prompt_id = self.accumulator.prompt_id(session_id);
        let Some(prompt_id) = prompt_id else {
            self.accumulator.remove(session_id);
            return Ok(());
        };

        let outcome = self.dispatch_session_close(session_id, &prompt_id).await;
        self.accumulator.remove(session_id);
        outcome
    }

    async fn dispatch_session_close(&self, session_id: &SessionId, prompt_id: &PromptId) -> Result<(), ListenerError> {
        let defs = self.loader.load_evals(prompt_id).await.map_err(|err| ListenerError::Loader(err.to_string()))?;
        let eval_ctx = self.accumulator.build_eval_context(session_id);
        let cancel = CancelSignal::new();

        let results = self
            .dispatcher
            .dispatch_session(&cancel, &defs, &eval_ctx, session_id, eval_ctx.turn_index)
            .await
            .map_err(|err| ListenerError::Dispatch(err.to_string()))?;

        if let Some(writer) = &self.writer {
            if !results.is_empty() {
                if let Err(err) = writer.write_results(&results) {
                    tracing::warn!(session_id = %session_id, error = %err, "result writer failed while closing session");
                }
            }
        }

        Ok(())
    }
}

/// Decodes and reacts to one `message_created` bus message: ignores
/// unparsable or non-actionable payloads, records the message, and spawns a
/// detached turn-eval dispatch for assistant messages.
fn handle_message(message: &BusMessage, accumulator: &Arc<SessionAccumulator>, dispatcher: &Arc<dyn Dispatcher>, loader: &Arc<dyn PackEvalLoader>, lifecycle: &CancellationToken) {
    let event: MessageCreatedEvent = match serde_json::from_slice(&message.data) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(subject = %message.subject, error = %err, "failed to decode message-created event, ignoring");
            return;
        }
    };

    if !event.is_actionable() {
        return;
    }

    let session_id = SessionId::new(event.session_id.clone());
    accumulator.add_message(&session_id, None, event.data.role.clone(), event.data.content.clone());

    if event.is_assistant_message() {
        let accumulator = accumulator.clone();
        let dispatcher = dispatcher.clone();
        let loader = loader.clone();
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            run_turn_dispatch(&session_id, &accumulator, &dispatcher, &loader, &lifecycle).await;
        });
    }
}

/// Loads the session's current prompt's definitions and dispatches a
/// turn-eval batch, cooperatively honoring `lifecycle` cancellation.
async fn run_turn_dispatch(session_id: &SessionId, accumulator: &Arc<SessionAccumulator>, dispatcher: &Arc<dyn Dispatcher>, loader: &Arc<dyn PackEvalLoader>, lifecycle: &CancellationToken) {
    let Some(prompt_id) = accumulator.prompt_id(session_id) else {
        tracing::debug!(session_id = %session_id, "no prompt id seeded yet, skipping turn dispatch");
        return;
    };

    let defs = match loader.load_evals(&prompt_id).await {
        Ok(defs) => defs,
        Err(err) => {
            tracing::warn!(session_id = %session_id, error = %err, "failed to load evals for turn dispatch");
            return;
        }
    };

    let eval_ctx = accumulator.build_eval_context(session_id);
    let cancel = CancelSignal::new();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();

    let watch_token = lifecycle.clone();
    let watch_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = watch_token.cancelled() => watch_cancel.cancel(),
            _ = done_rx => {}
        }
    });

    let result = dispatcher.dispatch_turn(&cancel, &defs, &eval_ctx, session_id, eval_ctx.turn_index).await;
    let _ = done_tx.send(());

    if let Err(err) = result {
        tracing::warn!(session_id = %session_id, error = %err, "turn-eval dispatch failed");
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "test-only assertions")]

    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use evalpack_core::EvalContext;
    use evalpack_core::EvalDef;
    use evalpack_core::EvalId;
    use evalpack_core::Trigger;
    use evalpack_dispatch::DispatchError;
    use evalpack_dispatch::InMemoryBus;
    use evalpack_dispatch::Publisher;

    use super::*;
    use crate::loader::LoaderError;

    struct RecordingDispatcher {
        turn_calls: Mutex<Vec<SessionId>>,
        session_calls: Mutex<Vec<SessionId>>,
    }

    impl RecordingDispatcher {
        fn new() -> Self {
            Self {
                turn_calls: Mutex::new(Vec::new()),
                session_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn dispatch_turn(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
            self.turn_calls.lock().unwrap().push(session_id.clone());
            Ok(Vec::new())
        }

        async fn dispatch_session(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
            self.session_calls.lock().unwrap().push(session_id.clone());
            Ok(vec![EvalResult::default()])
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

    struct CapturingWriter(Mutex<Vec<EvalResult>>);
    impl ResultWriter for CapturingWriter {
        fn write_results(&self, results: &[EvalResult]) -> Result<(), evalpack_core::WriterError> {
            self.0.lock().unwrap().extend_from_slice(results);
            Ok(())
        }
    }

    #[tokio::test]
    async fn assistant_message_triggers_turn_dispatch_but_user_message_does_not() {
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let listener = Arc::new(EventBusEvalListener::new(bus.clone(), dispatcher.clone(), Arc::new(StubLoader)));

        listener.accumulator().add_message(&SessionId::new("s1"), Some(&PromptId::new("p1")), "user", "hi");

        let listener_task = listener.clone();
        tokio::spawn(async move {
            let _ = listener_task.start().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let assistant_event = serde_json::to_vec(&MessageCreatedEvent {
            event_type: "message_created".to_string(),
            session_id: "s1".to_string(),
            data: crate::event::MessageData {
                role: "assistant".to_string(),
                content: "hello".to_string(),
            },
        })
        .unwrap();
        bus.publish(MESSAGE_CREATED_SUBJECT, assistant_event).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let user_event = serde_json::to_vec(&MessageCreatedEvent {
            event_type: "message_created".to_string(),
            session_id: "s1".to_string(),
            data: crate::event::MessageData {
                role: "user".to_string(),
                content: "another".to_string(),
            },
        })
        .unwrap();
        bus.publish(MESSAGE_CREATED_SUBJECT, user_event).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(dispatcher.turn_calls.lock().unwrap().len(), 1);
        listener.close();
    }

    #[tokio::test]
    async fn close_session_dispatches_and_forwards_to_writer_then_removes_state() {
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let writer = Arc::new(CapturingWriter(Mutex::new(Vec::new())));
        let listener = EventBusEvalListener::new(bus, dispatcher.clone(), Arc::new(StubLoader)).with_writer(writer.clone());

        let session_id = SessionId::new("s1");
        listener.accumulator().add_message(&session_id, Some(&PromptId::new("p1")), "user", "hi");

        listener.close_session(&session_id).await.unwrap();

        assert_eq!(dispatcher.session_calls.lock().unwrap().len(), 1);
        assert_eq!(writer.0.lock().unwrap().len(), 1);
        assert!(listener.accumulator().build_eval_context(&session_id).messages.is_empty());
    }

    #[tokio::test]
    async fn close_session_without_prompt_id_removes_without_dispatching() {
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let listener = EventBusEvalListener::new(bus, dispatcher.clone(), Arc::new(StubLoader));

        let session_id = SessionId::new("s1");
        listener.accumulator().add_message(&session_id, None, "user", "hi");
        listener.close_session(&session_id).await.unwrap();

        assert!(dispatcher.session_calls.lock().unwrap().is_empty());
    }
}
