// crates/evalpack-core/src/registry.rs
// ============================================================================
// Module: Evalpack Type Registry
// Description: Thread-safe map from handler type name to stateless handler.
// Purpose: Let callers register eval handlers once, at process init, and look
//          them up by name on every dispatch.
// Dependencies: crate::error, crate::model, std::sync
// ============================================================================

//! ## Overview
//! [`HandlerRegistry`] is a process-local `RwLock<BTreeMap<String, Arc<dyn
//! EvalHandler>>>`, matching this codebase's plain `std::sync`
//! convention (no `parking_lot`/`dashmap` anywhere in the workspace).
//! Handlers are stateless and must be safe to call from arbitrary threads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use serde_json::Value;

use crate::error::RegistryError;
use crate::model::EvalContext;
use crate::model::EvalResult;

// ============================================================================
// SECTION: Handler Trait
// ============================================================================

/// Errors a handler may return from [`EvalHandler::eval`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HandlerError {}

/// Pluggable implementation of one eval definition `type`.
///
/// # Invariants
/// - Implementations must be `Send + Sync` and callable from arbitrary
///   threads.
/// - Implementations hold no state that outlives a single `eval` call;
///   everything needed arrives via `ctx`/`params`.
pub trait EvalHandler: Send + Sync {
    /// Returns the handler's registered type name.
    fn eval_type(&self) -> &str;

    /// Evaluates `ctx` against `params`, producing a result.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the handler itself fails; this is
    /// distinct from reporting `passed: false`, which is a normal outcome.
    fn eval(&self, ctx: &EvalContext, params: &BTreeMap<String, Value>) -> Result<EvalResult, HandlerError>;

    /// Upper bound on how long a single `eval` call may run before the
    /// runner times it out. Defaults to the runner's own default (30s).
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Thread-safe, process-local map from handler type name to handler.
///
/// # Invariants
/// - `register` is idempotent replace: registering the same name twice
///   silently replaces the earlier handler.
/// - `types()` returns a sorted snapshot (the backing map is a `BTreeMap`).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn EvalHandler>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry, for isolated tests.
    ///
    /// Production code populates a process-init registry via [`Self::register`]
    /// calls at startup rather than constructing a fresh one per call site.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`, replacing any existing handler under the same
    /// type name. Poison-tolerant: a prior panicking writer does not prevent
    /// later registrations from taking effect.
    pub fn register(&self, handler: Arc<dyn EvalHandler>) {
        let eval_type = handler.eval_type().to_string();
        let mut handlers = self.handlers.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers.insert(eval_type, handler);
    }

    /// Looks up the handler registered under `eval_type`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownType`] when no handler is registered
    /// under that name.
    pub fn get(&self, eval_type: &str) -> Result<Arc<dyn EvalHandler>, RegistryError> {
        let handlers = self.handlers.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers
            .get(eval_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType(eval_type.to_string()))
    }

    /// Returns true when a handler is registered under `eval_type`.
    #[must_use]
    pub fn has(&self, eval_type: &str) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers.contains_key(eval_type)
    }

    /// Returns a sorted snapshot of all registered type names.
    #[must_use]
    pub fn types(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers.keys().cloned().collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::EvalId;

    struct StubHandler {
        name: &'static str,
    }

    impl EvalHandler for StubHandler {
        fn eval_type(&self) -> &str {
            self.name
        }

        fn eval(&self, _ctx: &EvalContext, _params: &BTreeMap<String, Value>) -> Result<EvalResult, HandlerError> {
            Ok(EvalResult {
                eval_id: EvalId::new("stub"),
                eval_type: self.name.to_string(),
                passed: true,
                ..EvalResult::default()
            })
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(StubHandler { name: "quality_check" }));
        assert!(registry.has("quality_check"));
        let lookup = registry.get("quality_check");
        assert!(lookup.is_ok());
        if let Ok(handler) = lookup {
            assert_eq!(handler.eval_type(), "quality_check");
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = HandlerRegistry::new();
        let err = registry.get("nope").expect_err("unregistered");
        assert_eq!(err, RegistryError::UnknownType("nope".to_string()));
    }

    #[test]
    fn register_is_idempotent_replace() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(StubHandler { name: "t" }));
        registry.register(Arc::new(StubHandler { name: "t" }));
        assert_eq!(registry.types(), vec!["t".to_string()]);
    }

    #[test]
    fn types_is_sorted() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(StubHandler { name: "zeta" }));
        registry.register(Arc::new(StubHandler { name: "alpha" }));
        assert_eq!(registry.types(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
