// crates/evalpack-listener/src/accumulator.rs
// ============================================================================
// Module: Evalpack Session Accumulator
// Description: Per-session message buffer driving auto-triggered evals.
// Purpose: Turn a stream of message-created events into an EvalContext
//          snapshot, with TTL-based eviction of idle sessions.
// Dependencies: evalpack_core, std::sync, std::time
// ============================================================================

//! ## Overview
//! [`SessionAccumulator`] is a process-local map `session_id -> SessionState`,
//! guarded by an outer `RwLock` for insertion/deletion and a per-session
//! `Mutex` for message-list mutation, never acquired in the reverse order
//! — outer lock first, inner lock second, never the reverse.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Instant;

use evalpack_core::EvalContext;
use evalpack_core::Message;
use evalpack_core::PromptId;
use evalpack_core::SessionId;

// ============================================================================
// SECTION: Session State
// ============================================================================

struct SessionState {
    messages: Vec<Message>,
    prompt_id: Option<PromptId>,
    last_seen: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            prompt_id: None,
            last_seen: Instant::now(),
        }
    }
}

// ============================================================================
// SECTION: Accumulator
// ============================================================================

/// Thread-safe, process-local per-session message accumulator.
#[derive(Debug, Default)]
pub struct SessionAccumulator {
    sessions: RwLock<BTreeMap<SessionId, Arc<Mutex<SessionState>>>>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState").field("message_count", &self.messages.len()).field("prompt_id", &self.prompt_id).finish()
    }
}

impl SessionAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one message for `session_id`, lazily creating session state.
    ///
    /// `prompt_id`, when `Some`, seeds or overwrites the remembered prompt
    /// id; a `None` prompt id preserves any earlier seeded value.
    pub fn add_message(&self, session_id: &SessionId, prompt_id: Option<&PromptId>, role: impl Into<String>, content: impl Into<String>) {
        let state = self.state_for(session_id);
        let mut state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.messages.push(Message::new(role, content));
        state.last_seen = Instant::now();
        if let Some(prompt_id) = prompt_id {
            state.prompt_id = Some(prompt_id.clone());
        }
    }

    fn state_for(&self, session_id: &SessionId) -> Arc<Mutex<SessionState>> {
        if let Some(state) = self.sessions.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(session_id) {
            return state.clone();
        }
        let mut sessions = self.sessions.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.entry(session_id.clone()).or_insert_with(|| Arc::new(Mutex::new(SessionState::new()))).clone()
    }

    /// Builds a fresh [`EvalContext`] snapshot for `session_id`. An unknown
    /// session returns an empty context carrying only the session id.
    #[must_use]
    pub fn build_eval_context(&self, session_id: &SessionId) -> EvalContext {
        let Some(state) = self.sessions.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(session_id).cloned() else {
            return EvalContext::with_session(session_id.clone());
        };
        let state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let turn_index = state.messages.iter().filter(|message| message.is_assistant()).count() as u64;
        let current_output = state.messages.iter().rev().find(|message| message.is_assistant()).map(|message| message.content.clone());

        EvalContext {
            messages: state.messages.clone(),
            turn_index,
            current_output,
            session_id: session_id.clone(),
            prompt_id: state.prompt_id.clone().unwrap_or_default(),
            ..EvalContext::default()
        }
    }

    /// Removes all state for `session_id`.
    pub fn remove(&self, session_id: &SessionId) {
        self.sessions.write().unwrap_or_else(std::sync::PoisonError::into_inner).remove(session_id);
    }

    /// Removes every session whose `last_seen` predates `cutoff`, returning
    /// the number removed.
    pub fn cleanup_before(&self, cutoff: Instant) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, state| state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).last_seen >= cutoff);
        before - sessions.len()
    }

    /// Returns the remembered prompt id for `session_id`, if any.
    #[must_use]
    pub fn prompt_id(&self, session_id: &SessionId) -> Option<PromptId> {
        let state = self.sessions.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(session_id)?.clone();
        state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).prompt_id.clone()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "test-only assertions")]

    use std::time::Duration;

    use super::*;

    #[test]
    fn unknown_session_returns_empty_context_with_session_id() {
        let accumulator = SessionAccumulator::new();
        let session_id = SessionId::new("unknown");
        let ctx = accumulator.build_eval_context(&session_id);
        assert_eq!(ctx.session_id, session_id);
        assert!(ctx.messages.is_empty());
        assert_eq!(ctx.turn_index, 0);
    }

    #[test]
    fn add_message_preserves_seeded_prompt_id_when_later_calls_pass_none() {
        let accumulator = SessionAccumulator::new();
        let session_id = SessionId::new("s1");
        let prompt_id = PromptId::new("p1");
        accumulator.add_message(&session_id, Some(&prompt_id), "user", "hi");
        accumulator.add_message(&session_id, None, "assistant", "hello");

        assert_eq!(accumulator.prompt_id(&session_id), Some(prompt_id));
        let ctx = accumulator.build_eval_context(&session_id);
        assert_eq!(ctx.turn_index, 1);
        assert_eq!(ctx.current_output.as_deref(), Some("hello"));
        assert_eq!(ctx.messages.len(), 2);
    }

    #[test]
    fn build_eval_context_uses_last_assistant_message_as_current_output() {
        let accumulator = SessionAccumulator::new();
        let session_id = SessionId::new("s1");
        accumulator.add_message(&session_id, None, "assistant", "first");
        accumulator.add_message(&session_id, None, "user", "interject");
        accumulator.add_message(&session_id, None, "assistant", "second");

        let ctx = accumulator.build_eval_context(&session_id);
        assert_eq!(ctx.turn_index, 2);
        assert_eq!(ctx.current_output.as_deref(), Some("second"));
    }

    #[test]
    fn remove_drops_all_session_state() {
        let accumulator = SessionAccumulator::new();
        let session_id = SessionId::new("s1");
        accumulator.add_message(&session_id, None, "user", "hi");
        accumulator.remove(&session_id);
        let ctx = accumulator.build_eval_context(&session_id);
        assert!(ctx.messages.is_empty());
    }

    #[test]
    fn cleanup_before_removes_only_stale_sessions() {
        let accumulator = SessionAccumulator::new();
        let old = SessionId::new("old");
        let recent = SessionId::new("recent");
        accumulator.add_message(&old, None, "user", "hi");
        std::thread::sleep(Duration::from_millis(20));
        let cutoff = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        accumulator.add_message(&recent, None, "user", "hi");

        let removed = accumulator.cleanup_before(cutoff);
        assert_eq!(removed, 1);
        assert!(accumulator.build_eval_context(&old).messages.is_empty());
        assert_eq!(accumulator.build_eval_context(&recent).messages.len(), 1);
    }
}
