// crates/evalpack-core/src/model/def.rs
// ============================================================================
// Module: Evalpack Definitions
// Description: Declarative eval definitions, triggers, metrics, and thresholds.
// Purpose: Describe what to evaluate, when, and how to score the outcome.
// Dependencies: crate::model::ids, serde
// ============================================================================

//! ## Overview
//! An [`EvalDef`] is an immutable, declarative assertion: an identifier, a
//! handler `type`, a firing [`Trigger`], a handler-defined `params` bag, and
//! optional metric/threshold/precondition attachments. Definitions are
//! produced by [`crate::resolver::resolve`] and checked by
//! [`crate::validator`] before the runner ever sees them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::model::ids::EvalId;

// ============================================================================
// SECTION: Trigger
// ============================================================================

/// Temporal rule deciding whether a definition fires for a given event.
///
/// # Invariants
/// - Values outside this enum are a validation error at load time; the
///   runner never observes an unrecognized trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Fires on every assistant turn.
    EveryTurn,
    /// Fires once, when a session completes.
    OnSessionComplete,
    /// Fires on a deterministic percentage of turns.
    SampleTurns,
    /// Fires on a deterministic percentage of sessions.
    SampleSessions,
    /// Fires once, when a conversation completes.
    OnConversationComplete,
    /// Fires on every workflow step.
    OnWorkflowStep,
}

// ============================================================================
// SECTION: Precondition (`when`)
// ============================================================================

/// Precondition evaluated against the tool-call list on the current context.
///
/// Clauses are ANDed; a `None` precondition always passes. Mirrors the
/// fail-closed posture of this codebase's comparator logic: an invalid
/// regex in `tool_called_pattern` does not panic, it yields a skip.
///
/// # Invariants
/// - An absent `when` is equivalent to a `when` whose every field is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct When {
    /// Requires at least one recorded tool call.
    #[serde(default, skip_serializing_if = "is_false")]
    pub any_tool_called: bool,
    /// Requires a tool call with this exact name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_called: Option<String>,
    /// Requires a tool call whose name matches this regex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_called_pattern: Option<String>,
    /// Requires at least this many recorded tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tool_calls: Option<usize>,
}

/// Returns true for `serde`'s `skip_serializing_if` on plain bools.
fn is_false(value: &bool) -> bool {
    !*value
}

impl When {
    /// Returns true when no clause is set (an always-passing precondition).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.any_tool_called
            && self.tool_called.is_none()
            && self.tool_called_pattern.is_none()
            && self.min_tool_calls.is_none()
    }
}

// ============================================================================
// SECTION: Metric Definition
// ============================================================================

/// Kind of time series a [`MetricDef`] describes.
///
/// # Invariants
/// - Variants are stable for serialization and the Prometheus text writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// A single overwritten value per series.
    Gauge,
    /// A monotonically incrementing count per series.
    Counter,
    /// A distribution of observed values per series.
    Histogram,
    /// A 1/0 value derived from `passed`, written as a gauge.
    Boolean,
}

/// Inclusive numeric range used for out-of-range warnings on recorded values.
///
/// # Invariants
/// - `min <= max` is enforced by the validator, not this type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    /// Minimum expected value.
    pub min: f64,
    /// Maximum expected value.
    pub max: f64,
}

/// Declarative metric attached to an [`EvalDef`].
///
/// # Invariants
/// - `name` matches `^[a-zA-Z_:][a-zA-Z0-9_:]*$`.
/// - `labels` keys match `^[a-zA-Z_][a-zA-Z0-9_]*$` and never start with `__`.
/// - Unknown/extra fields round-trip unchanged through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDef {
    /// Prometheus-compatible metric name (namespace is added by the collector).
    pub name: String,
    /// Metric series kind.
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    /// Optional expected value range, used only for warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<MetricRange>,
    /// Static labels merged with the collector's base labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Free-form extra fields preserved across serialization.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ============================================================================
// SECTION: Threshold
// ============================================================================

/// Post-handler pass/fail adjuster.
///
/// # Invariants
/// - Never transitions `passed` from `false` to `true`.
/// - A no-op when the result carries no `score`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// When true, a handler-reported pass is never overridden by score gates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    /// Minimum acceptable score, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    /// Maximum acceptable score, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
}

// ============================================================================
// SECTION: Eval Definition
// ============================================================================

/// Default sample percentage applied when a definition omits one.
pub const DEFAULT_SAMPLE_PERCENTAGE: f64 = 5.0;

/// Returns the default sample percentage for `serde(default = ...)`.
#[must_use]
const fn default_sample_percentage() -> f64 {
    DEFAULT_SAMPLE_PERCENTAGE
}

/// Returns `true` for `serde(default = ...)` on `enabled`.
#[must_use]
const fn default_enabled() -> bool {
    true
}

/// Declarative, immutable eval definition.
///
/// # Invariants
/// - `id` is unique within its pack/prompt scope (enforced by the validator,
///   not by this type).
/// - `trigger` resolves to one of the enumerated [`Trigger`] values or the
///   definition is rejected before it reaches the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalDef {
    /// Unique identifier within scope.
    pub id: EvalId,
    /// Handler type name, resolved through the type registry.
    #[serde(rename = "type")]
    pub eval_type: String,
    /// Firing trigger.
    pub trigger: Trigger,
    /// Handler-defined parameter bag.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Whether the definition is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Sampling percentage in `[0, 100]` for `sample_turns`/`sample_sessions`.
    #[serde(default = "default_sample_percentage")]
    pub sample_percentage: f64,
    /// Optional metric emitted when this definition runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricDef>,
    /// Optional pass/fail threshold adjustment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
    /// Optional precondition gating execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<When>,
    /// Human-oriented description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-oriented message, surfaced alongside results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EvalDef {
    /// Returns true when `trigger` is a sampling-based trigger.
    #[must_use]
    pub const fn is_sampled(&self) -> bool {
        matches!(self.trigger, Trigger::SampleTurns | Trigger::SampleSessions)
    }
}
