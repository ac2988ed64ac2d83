// crates/evalpack-core/src/runner.rs
// ============================================================================
// Module: Evalpack Runner
// Description: Sequential executor applying trigger, timeout, and panic
//              isolation to a batch of eval definitions.
// Purpose: Turn a list of definitions plus one EvalContext into a list of
//          EvalResults, with no single definition able to poison the batch.
// Dependencies: crate::{cancel, model, registry, resolver, threshold, trigger}
// ============================================================================

//! ## Overview
//! [`Runner`] exposes three entry points (`run_turn_evals`,
//! `run_session_evals`, `run_conversation_evals`), each parameterized by an
//! allowed-trigger set. Per definition, in list order: check
//! cancellation, check `enabled`/trigger-allowed, apply sampling +
//! precondition, look up the handler, invoke it under a timeout with panic
//! isolation, stamp `eval_id`/`type`/`duration_ms`, apply threshold, and
//! append to the result list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::time::Duration;
use std::time::Instant;

use crate::cancel::CancelSignal;
use crate::model::EvalContext;
use crate::model::EvalDef;
use crate::model::EvalResult;
use crate::model::Trigger;
use crate::registry::HandlerRegistry;
use crate::threshold;
use crate::trigger::Decision;
use crate::trigger::TriggerContext;
use crate::trigger::evaluate_when;
use crate::trigger::trigger_fires;

/// Default per-handler timeout, applied unless overridden by
/// [`RunnerConfig`] or the handler's own [`crate::registry::EvalHandler::timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Runner Configuration
// ============================================================================

/// Tunables for a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Upper bound on a single handler invocation, unless the handler
    /// requests a shorter one via `EvalHandler::timeout`.
    pub default_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { default_timeout: DEFAULT_TIMEOUT }
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Sequential executor for one batch of definitions against one
/// [`EvalContext`].
#[derive(Debug)]
pub struct Runner<'r> {
    registry: &'r HandlerRegistry,
    config: RunnerConfig,
}

impl<'r> Runner<'r> {
    /// Creates a runner bound to `registry`, using the default timeout.
    #[must_use]
    pub fn new(registry: &'r HandlerRegistry) -> Self {
        Self::with_config(registry, RunnerConfig::default())
    }

    /// Creates a runner bound to `registry` with an explicit [`RunnerConfig`].
    #[must_use]
    pub fn with_config(registry: &'r HandlerRegistry, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    /// Runs definitions triggered by assistant turns: `every_turn` and
    /// `sample_turns`. `is_session_complete` is always `false`.
    #[must_use]
    pub fn run_turn_evals(&self, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &crate::model::SessionId, turn_index: u64, cancel: &CancelSignal) -> Vec<EvalResult> {
        let trigger_ctx = TriggerContext {
            session_id,
            turn_index,
            is_session_complete: false,
        };
        self.run(defs, eval_ctx, &trigger_ctx, &[Trigger::EveryTurn, Trigger::SampleTurns], cancel)
    }

    /// Runs definitions triggered by session completion: `on_session_complete`
    /// and `sample_sessions`. `is_session_complete` is always `true`.
    #[must_use]
    pub fn run_session_evals(&self, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &crate::model::SessionId, turn_index: u64, cancel: &CancelSignal) -> Vec<EvalResult> {
        let trigger_ctx = TriggerContext {
            session_id,
            turn_index,
            is_session_complete: true,
        };
        self.run(defs, eval_ctx, &trigger_ctx, &[Trigger::OnSessionComplete, Trigger::SampleSessions], cancel)
    }

    /// Runs definitions triggered by conversation completion:
    /// `on_conversation_complete`. `is_session_complete` is always `true`.
    #[must_use]
    pub fn run_conversation_evals(&self, defs: &[EvalDef], eval_ctx: &EvalContext, session_id: &crate::model::SessionId, turn_index: u64, cancel: &CancelSignal) -> Vec<EvalResult> {
        let trigger_ctx = TriggerContext {
            session_id,
            turn_index,
            is_session_complete: true,
        };
        self.run(defs, eval_ctx, &trigger_ctx, &[Trigger::OnConversationComplete], cancel)
    }

    /// Shared execution loop behind the three public entry points.
    fn run(&self, defs: &[EvalDef], eval_ctx: &EvalContext, trigger_ctx: &TriggerContext<'_>, allowed: &[Trigger], cancel: &CancelSignal) -> Vec<EvalResult> {
        let mut results = Vec::with_capacity(defs.len());

        for def in defs {
            if cancel.is_cancelled() {
                break;
            }

            if !def.enabled || !allowed.contains(&def.trigger) {
                continue;
            }

            if !trigger_fires(def.trigger, def.sample_percentage, trigger_ctx) {
                continue;
            }

            if let Decision::Skip(reason) = evaluate_when(def.when.as_ref(), eval_ctx) {
                results.push(EvalResult::skipped(def.id.clone(), def.eval_type.clone(), reason));
                continue;
            }

            let started = Instant::now();
            let mut result = self.invoke(def, eval_ctx);
            #[expect(clippy::cast_possible_truncation, reason = "a single handler invocation never runs for u64::MAX milliseconds")]
            let elapsed_ms = started.elapsed().as_millis() as u64;
            result.eval_id = def.id.clone();
            result.eval_type = def.eval_type.clone();
            result.duration_ms = elapsed_ms;

            if let Some(threshold) = &def.threshold {
                threshold::apply(threshold, &mut result);
            }

            results.push(result);
        }

        results
    }

    /// Looks up and invokes the handler for `def`, timing the call and
    /// isolating both panics and unknown-type/nil-return failures into an
    /// `EvalResult`. `eval_id`/`type`/`duration_ms` are stamped by the
    /// caller.
    fn invoke(&self, def: &EvalDef, eval_ctx: &EvalContext) -> EvalResult {
        let handler = match self.registry.get(&def.eval_type) {
            Ok(handler) => handler,
            Err(err) => return EvalResult::error(def.id.clone(), def.eval_type.clone(), err.to_string()),
        };

        let timeout = handler.timeout().unwrap_or(self.config.default_timeout);
        let ctx = eval_ctx.clone();
        let params = def.params.clone();

        let (tx, rx) = mpsc::channel();
        let eval_id_for_panic_message = def.id.clone();
        let spawn_result = std::thread::Builder::new().name(format!("evalpack-handler-{}", def.id)).spawn(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler.eval(&ctx, &params)));
            let _ = tx.send(outcome);
        });

        if spawn_result.is_err() {
            return EvalResult::error(def.id.clone(), def.eval_type.clone(), "failed to spawn handler thread".to_string());
        }

        let started = Instant::now();
        match rx.recv_timeout(timeout) {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(handler_err))) => EvalResult::error(def.id.clone(), def.eval_type.clone(), handler_err.to_string()),
            Ok(Err(panic_payload)) => {
                let message = panic_message(&panic_payload);
                EvalResult::error(eval_id_for_panic_message, def.eval_type.clone(), format!("panic in eval {}: {message}", def.id))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => EvalResult::error(
                def.id.clone(),
                def.eval_type.clone(),
                format!("handler timed out after {:?} (elapsed {:?})", timeout, started.elapsed()),
            ),
            Err(mpsc::RecvTimeoutError::Disconnected) => EvalResult::error(def.id.clone(), def.eval_type.clone(), "handler thread terminated without a result".to_string()),
        }
    }
}

/// Extracts a human-readable message from a caught panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
