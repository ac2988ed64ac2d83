// crates/evalpack-dispatch/src/payload.rs
// ============================================================================
// Module: Evalpack Event Payload
// Description: Wire format published by the Event dispatcher.
// Purpose: Serialize a dispatch call's inputs for cross-process delivery.
// Dependencies: evalpack_core, serde, serde_json
// ============================================================================

//! ## Overview
//! [`EventPayload`] is `{defs, eval_ctx}`, snake_case on the wire, tolerant
//! of unknown fields on decode.
//! [`subject_for`] builds the `eval.<scope>.<session_id>` subject string the
//! publisher and worker both derive from the same [`Scope`] enum.

use evalpack_core::EvalContext;
use evalpack_core::EvalDef;
use serde::Deserialize;
use serde::Serialize;

/// Dispatch scope, used to build subject strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Per assistant turn.
    Turn,
    /// Per completed session.
    Session,
    /// Per completed conversation.
    Conversation,
}

impl Scope {
    /// Returns the subject-path segment for this scope (`"turn"`, `"session"`,
    /// `"conversation"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Turn => "turn",
            Self::Session => "session",
            Self::Conversation => "conversation",
        }
    }
}

/// Builds the subject `eval.<scope>.<session_id>`.
#[must_use]
pub fn subject_for(scope: Scope, session_id: &str) -> String {
    format!("eval.{}.{session_id}", scope.as_str())
}

/// Builds the worker's wildcard subscription subject `eval.<scope>.*`.
#[must_use]
pub fn wildcard_subject_for(scope: Scope) -> String {
    format!("eval.{}.*", scope.as_str())
}

/// Serialized payload published by the Event dispatcher.
///
/// # Invariants
/// - Field names are `snake_case` on the wire.
/// - Unknown fields are tolerated on decode (`#[serde(default)]` on every
///   field rather than `deny_unknown_fields`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPayload {
    /// The definitions the publisher asked to run.
    #[serde(default)]
    pub defs: Vec<EvalDef>,
    /// The eval context snapshot at publish time.
    #[serde(default)]
    pub eval_ctx: EvalContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_scheme_matches_scope() {
        assert_eq!(subject_for(Scope::Turn, "session-123"), "eval.turn.session-123");
        assert_eq!(subject_for(Scope::Session, "s"), "eval.session.s");
        assert_eq!(subject_for(Scope::Conversation, "s"), "eval.conversation.s");
        assert_eq!(wildcard_subject_for(Scope::Turn), "eval.turn.*");
    }

    #[test]
    fn payload_round_trips_and_tolerates_unknown_fields() {
        let payload = EventPayload::default();
        let json = serde_json::to_string(&payload);
        assert!(json.is_ok());
        if let Ok(json) = json {
            let decoded: Result<EventPayload, _> = serde_json::from_str(&json);
            assert!(decoded.is_ok_and(|p| p.defs.is_empty()));
        }

        let with_extra = r#"{"defs": [], "eval_ctx": {}, "future_field": 42}"#;
        let decoded: Result<EventPayload, _> = serde_json::from_str(with_extra);
        assert!(decoded.is_ok_and(|p| p.defs.is_empty()));
    }
}
