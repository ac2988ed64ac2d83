// crates/evalpack-core/src/judge.rs
// ============================================================================
// Module: Judge Provider Contract
// Description: External LLM-judge collaborator interface and response parsing.
// Purpose: Define the seam judge-type handlers call through, without
//          depending on any concrete provider implementation.
// Dependencies: crate::model::ids, serde_json
// ============================================================================

//! ## Overview
//! The judge provider is an external collaborator: this crate only
//! specifies the contract and the response-parsing helper shared by judge
//! handlers and the REST/agent bridge. Concrete providers (calling an LLM)
//! are out of scope for this workspace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Judge Contract
// ============================================================================

/// Options passed to a judge provider for a single judgment call.
///
/// # Invariants
/// - `content` and `criteria` are required by every provider; the remaining
///   fields are provider-specific hints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeOpts {
    /// Content being judged.
    pub content: String,
    /// Judging criteria.
    pub criteria: String,
    /// Optional rubric text.
    pub rubric: Option<String>,
    /// Optional model identifier override.
    pub model: Option<String>,
    /// Optional system prompt override.
    pub system_prompt: Option<String>,
    /// Optional minimum score threshold for the pass/fail decision.
    pub min_score: Option<f64>,
    /// Provider-specific extra parameters.
    pub extras: BTreeMap<String, Value>,
}

/// Outcome of a judge provider call.
///
/// # Invariants
/// - `score`, when present, is conventionally in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeResult {
    /// Whether the judged content passed.
    pub passed: bool,
    /// Judge-assigned score.
    pub score: Option<f64>,
    /// Judge-supplied reasoning text.
    pub reasoning: String,
    /// Raw, unparsed provider response.
    pub raw: String,
}

/// Errors surfaced by a judge provider call.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The provider reported an error.
    #[error("judge provider error: {0}")]
    Provider(String),
}

/// Opaque, external judge provider.
///
/// Retrieved from [`crate::model::EvalContext::judge_provider`]; never
/// constructed by this crate.
pub trait JudgeProvider: fmt::Debug + Send + Sync {
    /// Judges `opts.content` against `opts.criteria`.
    ///
    /// # Errors
    ///
    /// Returns [`JudgeError`] when the provider call fails.
    fn judge(&self, opts: &JudgeOpts) -> Result<JudgeResult, JudgeError>;
}

// ============================================================================
// SECTION: Response Parsing
// ============================================================================

/// Default pass/fail threshold applied when neither the provider response
/// nor the caller supplies one.
pub const DEFAULT_JUDGE_THRESHOLD: f64 = 0.5;

/// Parses a raw judge response into a [`JudgeResult`].
///
/// Extracts JSON between the first `{` and the last `}` in `raw`. If that
/// slice fails to decode, falls back to a permissive default rather than
/// failing the eval outright: `{passed: true, score: 0.5, reasoning:
/// "Could not parse judge response"}`.
///
/// If the decoded object has an explicit `passed` field, it wins. Otherwise
/// the decoded (or default) `score` is compared against `min_score`, or
/// against [`DEFAULT_JUDGE_THRESHOLD`] when no `min_score` is supplied.
#[must_use]
pub fn parse_judge_response(raw: &str, min_score: Option<f64>) -> JudgeResult {
    let parsed = extract_json_object(raw).and_then(|slice| serde_json::from_str::<Value>(slice).ok());

    let Some(value) = parsed else {
        return JudgeResult {
            passed: true,
            score: Some(DEFAULT_JUDGE_THRESHOLD),
            reasoning: "Could not parse judge response".to_string(),
            raw: raw.to_string(),
        };
    };

    let explicit_passed = value.get("passed").and_then(Value::as_bool);
    let score = value.get("score").and_then(Value::as_f64);
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let passed = explicit_passed.unwrap_or_else(|| {
        let threshold = min_score.unwrap_or(DEFAULT_JUDGE_THRESHOLD);
        score.is_some_and(|score| score >= threshold)
    });

    JudgeResult {
        passed,
        score,
        reasoning,
        raw: raw.to_string(),
    }
}

/// Extracts the substring from the first `{` to the last `}`, inclusive.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start ..= end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_passed() {
        let result = parse_judge_response(
            r#"noise before {"passed": false, "score": 0.9, "reasoning": "nope"} noise after"#,
            None,
        );
        assert!(!result.passed);
        assert_eq!(result.score, Some(0.9));
        assert_eq!(result.reasoning, "nope");
    }

    #[test]
    fn falls_back_to_score_threshold_when_passed_absent() {
        let result = parse_judge_response(r#"{"score": 0.8}"#, Some(0.7));
        assert!(result.passed);

        let result = parse_judge_response(r#"{"score": 0.6}"#, Some(0.7));
        assert!(!result.passed);
    }

    #[test]
    fn falls_back_to_default_threshold_without_min_score() {
        let result = parse_judge_response(r#"{"score": 0.5}"#, None);
        assert!(result.passed);
        let result = parse_judge_response(r#"{"score": 0.49}"#, None);
        assert!(!result.passed);
    }

    #[test]
    fn unparseable_response_defaults_to_permissive_pass() {
        let result = parse_judge_response("not json at all", None);
        assert!(result.passed);
        assert_eq!(result.score, Some(DEFAULT_JUDGE_THRESHOLD));
        assert_eq!(result.reasoning, "Could not parse judge response");
    }
}
