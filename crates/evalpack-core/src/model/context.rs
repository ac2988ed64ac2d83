// crates/evalpack-core/src/model/context.rs
// ============================================================================
// Module: Evalpack Context
// Description: Handler input: message history, tool calls, and carried state.
// Purpose: Give stateless handlers everything they need in one snapshot.
// Dependencies: crate::model::ids, crate::judge, serde, serde_json
// ============================================================================

//! ## Overview
//! [`EvalContext`] is the single input handlers receive. Handlers hold no
//! state of their own (see `DESIGN.md`); everything arrives here, including
//! the judge provider (carried out-of-band, see [`EvalContext::providers`])
//! and workflow `extras`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::judge::JudgeProvider;
use crate::model::ids::PromptId;
use crate::model::ids::SessionId;

// ============================================================================
// SECTION: Messages
// ============================================================================

/// A single message in the accumulated session transcript.
///
/// # Invariants
/// - `role` is an opaque string; only `"assistant"` has core-level meaning
///   (it drives `turn_index` and listener auto-dispatch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role (`"user"`, `"assistant"`, `"system"`, `"tool"`, ...).
    pub role: String,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Creates a new message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Returns true when this message has the `"assistant"` role.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

// ============================================================================
// SECTION: Tool Calls
// ============================================================================

/// A recorded tool invocation made during the conversation.
///
/// # Invariants
/// - `turn_index` refers to the assistant turn during which the call happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Assistant turn during which the call was made.
    pub turn_index: u64,
    /// Tool name invoked.
    pub tool_name: String,
    /// Arguments passed to the tool.
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    /// Opaque tool result, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error string, when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// SECTION: Eval Context
// ============================================================================

/// Snapshot of conversation state passed to a handler.
///
/// # Invariants
/// - `messages` is ordered oldest-first.
/// - `turn_index` equals the count of assistant messages in `messages`.
/// - `providers` never crosses the wire: it defaults to empty on
///   deserialization and is skipped on serialization, since the `Event`
///   dispatcher never runs handlers locally and has no use for live
///   provider handles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalContext {
    /// Ordered message history.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Count of assistant turns observed so far.
    #[serde(default)]
    pub turn_index: u64,
    /// Content of the last assistant message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_output: Option<String>,
    /// Session identifier.
    #[serde(default, skip_serializing_if = "is_empty_session")]
    pub session_id: SessionId,
    /// Prompt identifier.
    #[serde(default, skip_serializing_if = "is_empty_prompt")]
    pub prompt_id: PromptId,
    /// Tool calls recorded for this session.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Handler-visible variable bag.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Handler-visible metadata bag (e.g. `judge_targets` provider specs).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Workflow state carrier, opaque to the core.
    #[serde(default)]
    pub extras: BTreeMap<String, Value>,
    /// Live, non-serializable collaborator handles, keyed by the same string
    /// a caller stores as the value of `metadata["judge_provider"]` (see
    /// [`EvalContext::judge_provider`]).
    #[serde(skip)]
    pub providers: BTreeMap<String, Arc<dyn JudgeProvider>>,
}

fn is_empty_session(id: &SessionId) -> bool {
    id.is_empty()
}

fn is_empty_prompt(id: &PromptId) -> bool {
    id.is_empty()
}

impl EvalContext {
    /// Creates an empty context carrying only a session id, as returned by
    /// [`crate::registry`]-adjacent accumulator lookups for unknown sessions.
    #[must_use]
    pub fn with_session(session_id: SessionId) -> Self {
        Self {
            session_id,
            ..Self::default()
        }
    }

    /// Retrieves the judge provider through `metadata["judge_provider"]`, per
    /// spec: that entry holds a string key, and `providers` is looked up by
    /// that key (a live `Arc<dyn JudgeProvider>` cannot itself live in
    /// `metadata`, a `serde_json::Value` map — see `DESIGN.md`). Returns
    /// `None` if the metadata entry is absent, isn't a string, or names a key
    /// with no matching entry in `providers`.
    #[must_use]
    pub fn judge_provider(&self) -> Option<Arc<dyn JudgeProvider>> {
        let key = self.metadata.get("judge_provider").and_then(Value::as_str)?;
        self.providers.get(key).cloned()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
