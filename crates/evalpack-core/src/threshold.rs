// crates/evalpack-core/src/threshold.rs
// ============================================================================
// Module: Evalpack Threshold
// Description: Post-handler pass/fail gate adjustment.
// Purpose: Apply score-based pass/fail gates without ever rescuing a failure.
// Dependencies: crate::model
// ============================================================================

//! ## Overview
//! [`apply`] is the single function the runner calls after a handler
//! returns, when the definition carries a [`Threshold`]. It never turns a
//! handler-reported failure into a pass, and it is a no-op against missing
//! score data.

use crate::model::EvalResult;
use crate::model::Threshold;

/// Applies `threshold` to `result.passed` in place.
///
/// Rules, combined by AND:
/// - `threshold.passed == Some(true)` never rescues an already-failing
///   result.
/// - `min_score`/`max_score` gates only apply when `result.score` is set;
///   a missing score leaves `passed` untouched.
pub fn apply(threshold: &Threshold, result: &mut EvalResult) {
    if threshold.passed == Some(true) && !result.passed {
        return;
    }

    let Some(score) = result.score else {
        return;
    };

    let mut gated = result.passed;
    if let Some(min_score) = threshold.min_score {
        gated &= score >= min_score;
    }
    if let Some(max_score) = threshold.max_score {
        gated &= score <= max_score;
    }
    result.passed = gated;
}
