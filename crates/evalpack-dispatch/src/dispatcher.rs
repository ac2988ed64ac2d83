// crates/evalpack-dispatch/src/dispatcher.rs
// ============================================================================
// Module: Evalpack Dispatcher
// Description: Dispatch placement strategy: InProc, Event, NoOp.
// Purpose: Let callers choose where/how evals execute without changing call
//          sites.
// Dependencies: evalpack_core, crate::{bus, payload}, tokio
// ============================================================================

//! ## Overview
//! [`Dispatcher`] is a polymorphic interface with three methods, one per
//! temporal scope. [`InProcDispatcher`] runs the [`evalpack_core::Runner`]
//! locally and forwards results to a [`evalpack_core::ResultWriter`].
//! [`EventDispatcher`] serializes the call and publishes it; it never runs
//! handlers locally. [`NoOpDispatcher`] discards everything silently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use evalpack_core::CancelSignal;
use evalpack_core::EvalContext;
use evalpack_core::EvalDef;
use evalpack_core::EvalResult;
use evalpack_core::HandlerRegistry;
use evalpack_core::ResultWriter;
use evalpack_core::Runner;
use evalpack_core::RunnerConfig;
use evalpack_core::SessionId;
use thiserror::Error;

use crate::bus::Publisher;
use crate::payload::EventPayload;
use crate::payload::Scope;
use crate::payload::subject_for;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by a [`Dispatcher`] call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The configured result writer failed. Results are still returned to
    /// the caller — a writer error never discards them.
    #[error("result writer failed: {0}")]
    Writer(String),
    /// The event bus rejected the publish call.
    #[error("event publish failed: {0}")]
    Publish(String),
    /// The event payload failed to serialize.
    #[error("event payload serialization failed: {0}")]
    Serialize(String),
    /// The in-process runner could not be executed (e.g. the blocking task
    /// panicked or was cancelled by the runtime).
    #[error("runner task failed: {0}")]
    Runner(String),
}

// ============================================================================
// SECTION: Dispatcher Trait
// ============================================================================

/// Strategy object deciding where/how a batch of definitions executes.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    /// Dispatches turn-scoped evals (`every_turn`, `sample_turns`).
    ///
    /// # Errors
    ///
    /// See [`DispatchError`].
    async fn dispatch_turn(&self, cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, turn_index: u64) -> Result<Vec<EvalResult>, DispatchError>;

    /// Dispatches session-scoped evals (`on_session_complete`, `sample_sessions`).
    ///
    /// # Errors
    ///
    /// See [`DispatchError`].
    async fn dispatch_session(&self, cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, turn_index: u64) -> Result<Vec<EvalResult>, DispatchError>;

    /// Dispatches conversation-scoped evals (`on_conversation_complete`).
    ///
    /// # Errors
    ///
    /// See [`DispatchError`].
    async fn dispatch_conversation(&self, cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, turn_index: u64) -> Result<Vec<EvalResult>, DispatchError>;
}

// ============================================================================
// SECTION: InProc Dispatcher
// ============================================================================

/// Runs the [`Runner`] in-process and forwards non-empty results to a
/// configured [`ResultWriter`]. A `None` writer is a valid, silent no-op.
pub struct InProcDispatcher {
    registry: Arc<HandlerRegistry>,
    config: RunnerConfig,
    writer: Option<Arc<dyn ResultWriter>>,
}

impl InProcDispatcher {
    /// Creates an in-process dispatcher with the default runner config and
    /// no writer.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            config: RunnerConfig::default(),
            writer: None,
        }
    }

    /// Attaches a result writer, replacing any previously configured one.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn ResultWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Overrides the runner configuration (e.g. per-handler timeout).
    #[must_use]
    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    async fn run_and_write<F>(&self, run: F) -> Result<Vec<EvalResult>, DispatchError>
    where
        F: FnOnce(&Runner<'_>) -> Vec<EvalResult> + Send + 'static,
    {
        tracing::debug!("dispatching eval batch in-process");
        let registry = self.registry.clone();
        let config = self.config;
        let results = tokio::task::spawn_blocking(move || {
            let runner = Runner::with_config(&registry, config);
            run(&runner)
        })
        .await
        .map_err(|err| DispatchError::Runner(err.to_string()))?;

        tracing::debug!(result_count = results.len(), "in-process eval batch finished");

        if !results.is_empty() {
            if let Some(writer) = &self.writer {
                writer.write_results(&results).map_err(|err| DispatchError::Writer(err.to_string()))?;
            }
        }

        Ok(results)
    }
}

#[async_trait::async_trait]
impl Dispatcher for InProcDispatcher {
    async fn dispatch_turn(&self, cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        let defs = defs.to_vec();
        let eval_ctx = eval_ctx.clone();
        let session_id = session_id.clone();
        let cancel = cancel.clone();
        self.run_and_write(move |runner| runner.run_turn_evals(&defs, &eval_ctx, &session_id, turn_index, &cancel)).await
    }

    async fn dispatch_session(&self, cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        let defs = defs.to_vec();
        let eval_ctx = eval_ctx.clone();
        let session_id = session_id.clone();
        let cancel = cancel.clone();
        self.run_and_write(move |runner| runner.run_session_evals(&defs, &eval_ctx, &session_id, turn_index, &cancel)).await
    }

    async fn dispatch_conversation(&self, cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        let defs = defs.to_vec();
        let eval_ctx = eval_ctx.clone();
        let session_id = session_id.clone();
        let cancel = cancel.clone();
        self.run_and_write(move |runner| runner.run_conversation_evals(&defs, &eval_ctx, &session_id, turn_index, &cancel)).await
    }
}

// ============================================================================
// SECTION: Event Dispatcher
// ============================================================================

/// Publishes `{defs, eval_ctx}` on `eval.<scope>.<session_id>` and returns an
/// empty result list. Never runs handlers locally.
pub struct EventDispatcher {
    publisher: Arc<dyn Publisher>,
}

impl EventDispatcher {
    /// Creates an event dispatcher backed by `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    async fn publish(&self, scope: Scope, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId) -> Result<Vec<EvalResult>, DispatchError> {
        let payload = EventPayload {
            defs: defs.to_vec(),
            eval_ctx: eval_ctx.clone(),
        };
        let body = serde_json::to_vec(&payload).map_err(|err| DispatchError::Serialize(err.to_string()))?;
        let subject = subject_for(scope, session_id.as_str());
        tracing::debug!(%subject, def_count = payload.defs.len(), "publishing eval batch to event bus");
        self.publisher.publish(&subject, body).await.map_err(|err| DispatchError::Publish(err.to_string()))?;
        Ok(Vec::new())
    }
}

#[async_trait::async_trait]
impl Dispatcher for EventDispatcher {
    async fn dispatch_turn(&self, _cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        self.publish(Scope::Turn, defs, eval_ctx, session_id).await
    }

    async fn dispatch_session(&self, _cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        self.publish(Scope::Session, defs, eval_ctx, session_id).await
    }

    async fn dispatch_conversation(&self, _cancel: &CancelSignal, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        self.publish(Scope::Conversation, defs, eval_ctx, session_id).await
    }
}

// ============================================================================
// SECTION: NoOp Dispatcher
// ============================================================================

/// Discards every dispatch call, returning an empty result list.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDispatcher;

#[async_trait::async_trait]
impl Dispatcher for NoOpDispatcher {
    async fn dispatch_turn(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, _session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        Ok(Vec::new())
    }

    async fn dispatch_session(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, _session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        Ok(Vec::new())
    }

    async fn dispatch_conversation(&self, _cancel: &CancelSignal, _defs: &[EvalDef], _eval_ctx: &EvalContext, _session_id: &SessionId, _turn_index: u64) -> Result<Vec<EvalResult>, DispatchError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
