// crates/evalpack-dispatch/src/worker.rs
// ============================================================================
// Module: Evalpack Eval Worker
// Description: Symmetric consumer of Event-dispatched payloads.
// Purpose: Run turn/session evals published by an `EventDispatcher`
//          elsewhere in the system.
// Dependencies: evalpack_core, crate::{bus, payload}, tokio, tracing
// ============================================================================

//! ## Overview
//! [`EvalWorker`] subscribes to `eval.turn.*` and `eval.session.*`, decodes
//! each [`crate::payload::EventPayload`], invokes the runner's turn/session
//! entry points using a fresh root [`CancelSignal`] (the publisher's
//! cancellation is not portable across the bus), and forwards results to its
//! own writer. Decode errors are logged and the event is skipped;
//! subscription errors propagate from `start`.

use std::sync::Arc;

use evalpack_core::CancelSignal;
use evalpack_core::HandlerRegistry;
use evalpack_core::ResultWriter;
use evalpack_core::Runner;
use evalpack_core::RunnerConfig;
use thiserror::Error;

use crate::bus::BusMessage;
use crate::bus::Subscriber;
use crate::payload::EventPayload;
use crate::payload::wildcard_subject_for;
use crate::payload::Scope;

/// Errors surfaced by [`EvalWorker::start`].
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A subscription ended with a fatal transport error.
    #[error("worker subscription failed: {0}")]
    Subscription(String),
}

/// Counterpart to [`crate::dispatcher::EventDispatcher`]: consumes published
/// turn/session eval requests and runs them through the same core runner.
pub struct EvalWorker<S> {
    subscriber: Arc<S>,
    registry: Arc<HandlerRegistry>,
    config: RunnerConfig,
    writer: Option<Arc<dyn ResultWriter>>,
}

impl<S> EvalWorker<S>
where
    S: Subscriber + 'static,
{
    /// Creates a worker subscribing through `subscriber`, running handlers
    /// registered in `registry`.
    #[must_use]
    pub fn new(subscriber: Arc<S>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            subscriber,
            registry,
            config: RunnerConfig::default(),
            writer: None,
        }
    }

    /// Attaches a result writer for results produced by consumed events.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn ResultWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Runs two concurrent subscription tasks (`eval.turn.*`, `eval.session.*`)
    /// for the lifetime of this call. Returns when either subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Subscription`] on a fatal transport error from
    /// either subscription.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let turn = self.run_scope(Scope::Turn);
        let session = self.run_scope(Scope::Session);
        tokio::try_join!(turn, session)?;
        Ok(())
    }

    async fn run_scope(&self, scope: Scope) -> Result<(), WorkerError> {
        let registry = self.registry.clone();
        let config = self.config;
        let writer = self.writer.clone();

        let handler: crate::bus::MessageHandler = Box::new(move |message: BusMessage| {
            let registry = registry.clone();
            let writer = writer.clone();
            Box::pin(async move {
                handle_message(scope, &message, &registry, config, writer.as_deref()).await;
            })
        });

        self.subscriber
            .subscribe(&wildcard_subject_for(scope), handler)
            .await
            .map_err(|err| WorkerError::Subscription(err.to_string()))
    }
}

async fn handle_message(scope: Scope, message: &BusMessage, registry: &Arc<HandlerRegistry>, config: RunnerConfig, writer: Option<&dyn ResultWriter>) {
    let payload: EventPayload = match serde_json::from_slice(&message.data) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(subject = %message.subject, error = %err, "failed to decode eval event payload, skipping");
            return;
        }
    };

    let registry = registry.clone();
    let session_id = payload.eval_ctx.session_id.clone();
    let turn_index = payload.eval_ctx.turn_index;
    let cancel = CancelSignal::new();

    let results = tokio::task::spawn_blocking(move || {
        let runner = Runner::with_config(&registry, config);
        match scope {
            Scope::Turn => runner.run_turn_evals(&payload.defs, &payload.eval_ctx, &session_id, turn_index, &cancel),
            Scope::Session => runner.run_session_evals(&payload.defs, &payload.eval_ctx, &session_id, turn_index, &cancel),
            Scope::Conversation => runner.run_conversation_evals(&payload.defs, &payload.eval_ctx, &session_id, turn_index, &cancel),
        }
    })
    .await;

    let Ok(results) = results else {
        tracing::warn!(subject = %message.subject, "runner task panicked while handling eval event");
        return;
    };

    if results.is_empty() {
        return;
    }
    if let Some(writer) = writer {
        if let Err(err) = writer.write_results(&results) {
            tracing::warn!(subject = %message.subject, error = %err, "result writer failed for worker-dispatched results");
        }
    }
}
