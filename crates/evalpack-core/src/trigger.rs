// crates/evalpack-core/src/trigger.rs
// ============================================================================
// Module: Evalpack Trigger & Sampling
// Description: Deterministic trigger-fires-or-not decisions.
// Purpose: Decide, without any shared state, whether a definition should run
//          for a given trigger context.
// Dependencies: crate::model, regex
// ============================================================================

//! ## Overview
//! [`should_run`] is the single entry point the runner consults per
//! definition: it combines the trigger table, the FNV-1a deterministic
//! sampling hash, and the `when` precondition into one yes/no/skip-reason
//! decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;

use crate::model::EvalContext;
use crate::model::SessionId;
use crate::model::Trigger;
use crate::model::When;

// ============================================================================
// SECTION: Trigger Context
// ============================================================================

/// Per-dispatch-call context the trigger table is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext<'a> {
    /// Session the definition is evaluated for.
    pub session_id: &'a SessionId,
    /// Current assistant-turn count.
    pub turn_index: u64,
    /// Whether the surrounding session (or conversation) has just completed.
    pub is_session_complete: bool,
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Outcome of a trigger+sampling+precondition evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The definition should run.
    Run,
    /// The definition should be skipped, with a human-readable reason.
    Skip(String),
}

/// Decides whether a definition fires for `trigger_ctx`, applying the
/// trigger table, deterministic sampling, and the `when` precondition
/// in that order.
#[must_use]
pub fn should_run(trigger: Trigger, sample_percentage: f64, when: Option<&When>, trigger_ctx: &TriggerContext<'_>, eval_ctx: &EvalContext) -> Decision {
    if !trigger_fires(trigger, sample_percentage, trigger_ctx) {
        return Decision::Skip(format!("trigger {trigger:?} did not fire"));
    }
    evaluate_when(when, eval_ctx)
}

/// Evaluates just the trigger table and sampling, without the `when`
/// precondition.
#[must_use]
pub fn trigger_fires(trigger: Trigger, sample_percentage: f64, ctx: &TriggerContext<'_>) -> bool {
    match trigger {
        Trigger::EveryTurn | Trigger::OnWorkflowStep => true,
        Trigger::OnSessionComplete | Trigger::OnConversationComplete => ctx.is_session_complete,
        Trigger::SampleTurns => hit(ctx.session_id, ctx.turn_index, sample_percentage),
        Trigger::SampleSessions => hit(ctx.session_id, 0, sample_percentage),
    }
}

// ============================================================================
// SECTION: Deterministic Sampling
// ============================================================================

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Computes the 64-bit FNV-1a hash of `bytes`.
#[must_use]
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic sampling decision.
///
/// Hashes `session_id ∥ decimal(turn_index)` with FNV-1a, then fires iff
/// `(hash mod 10000) < floor(pct * 100)`. `pct <= 0` never fires; `pct >=
/// 100` always fires.
#[must_use]
pub fn hit(session_id: &SessionId, turn_index: u64, pct: f64) -> bool {
    if pct <= 0.0 {
        return false;
    }
    if pct >= 100.0 {
        return true;
    }
    let mut input = session_id.as_str().to_string();
    input.push_str(&turn_index.to_string());
    let hash = fnv1a(input.as_bytes());
    let modulus: u64 = 10_000;
    #[expect(clippy::cast_possible_truncation, reason = "pct is validated into [0, 100] before this point")]
    #[expect(clippy::cast_sign_loss, reason = "pct * 100 is non-negative once pct > 0.0")]
    let threshold = (pct * 100.0).floor() as u64;
    (hash % modulus) < threshold
}

// ============================================================================
// SECTION: Precondition (`when`)
// ============================================================================

/// Evaluates a `when` precondition against `ctx.tool_calls`.
///
/// A `None` (or empty) precondition always passes. A `None` tool-call list
/// is treated the same as an empty one. An invalid `tool_called_pattern`
/// regex is not a panic: it yields a skip with an explanatory reason.
#[must_use]
pub fn evaluate_when(when: Option<&When>, ctx: &EvalContext) -> Decision {
    let Some(when) = when else {
        return Decision::Run;
    };
    if when.is_empty() {
        return Decision::Run;
    }

    let tool_calls = &ctx.tool_calls;

    if when.any_tool_called && tool_calls.is_empty() {
        return Decision::Skip("precondition any_tool_called unmet: no tool calls recorded".to_string());
    }

    if let Some(name) = &when.tool_called {
        if !tool_calls.iter().any(|call| &call.tool_name == name) {
            return Decision::Skip(format!("precondition tool_called={name} unmet"));
        }
    }

    if let Some(pattern) = &when.tool_called_pattern {
        match Regex::new(pattern) {
            Ok(regex) => {
                if !tool_calls.iter().any(|call| regex.is_match(&call.tool_name)) {
                    return Decision::Skip(format!("precondition tool_called_pattern={pattern} unmet"));
                }
            }
            Err(err) => {
                return Decision::Skip(format!("precondition tool_called_pattern={pattern} is not a valid regex: {err}"));
            }
        }
    }

    if let Some(min) = when.min_tool_calls {
        if tool_calls.len() < min {
            return Decision::Skip(format!("precondition min_tool_calls={min} unmet: saw {}", tool_calls.len()));
        }
    }

    Decision::Run
}

// ============================================================================
// SECTION: Tests
// ============================================================================
