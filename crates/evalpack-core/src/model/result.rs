// crates/evalpack-core/src/model/result.rs
// ============================================================================
// Module: Evalpack Results
// Description: Outcome of a single executed eval definition.
// Purpose: Carry pass/fail, scoring, and diagnostic data to writers.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`EvalResult`] is produced once per executed [`crate::model::EvalDef`].
//! `eval_id` and `type` are always overwritten by the runner before a result
//! reaches a writer; handlers should not rely on the values
//! they set for those two fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::model::ids::EvalId;

// ============================================================================
// SECTION: Eval Result
// ============================================================================

/// Outcome of one executed eval definition.
///
/// # Invariants
/// - `eval_id` and `type` are overwritten by the runner, never left as the
///   handler supplied them.
/// - `duration_ms` is always `>= 0` once the runner has finished timing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Identifier of the definition that produced this result.
    pub eval_id: EvalId,
    /// Handler type name that produced this result.
    #[serde(rename = "type")]
    pub eval_type: String,
    /// Whether the assertion passed.
    pub passed: bool,
    /// Optional score, conventionally in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Optional metric value, preferred over `score` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<f64>,
    /// Human-readable explanation of the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Wall-clock duration of the handler invocation, in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Error string, set when the handler or runner failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured violation details.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Value>,
    /// Free-form structured detail bag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
    /// True when the definition was evaluated but intentionally skipped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    /// Explanation for why the definition was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl EvalResult {
    /// Builds a result representing a runner-level error (unknown type,
    /// handler panic, timeout, or a nil-without-error handler return).
    #[must_use]
    pub fn error(eval_id: EvalId, eval_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            eval_id,
            eval_type: eval_type.into(),
            passed: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Builds a result representing a skipped definition with a reason.
    #[must_use]
    pub fn skipped(
        eval_id: EvalId,
        eval_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            eval_id,
            eval_type: eval_type.into(),
            passed: false,
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Returns the effective numeric value for metric recording: the
    /// `metric_value` when present, else `score`, else `0.0`.
    #[must_use]
    pub fn effective_value(&self) -> f64 {
        self.metric_value.or(self.score).unwrap_or(0.0)
    }
}
