// crates/evalpack-core/src/error.rs
// ============================================================================
// Module: Evalpack Core Errors
// Description: Error types shared across the registry, runner, and resolver.
// Purpose: Stable, programmatically matchable failure variants.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! `evalpack-core` never panics on bad input data; everything flows through
//! [`RegistryError`] or an [`crate::model::EvalResult::error`] instead.

use thiserror::Error;

/// Errors from the [`crate::registry::HandlerRegistry`].
///
/// # Invariants
/// - Variants are stable for programmatic handling by the runner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No handler is registered under the requested type name.
    #[error("unknown eval type: {0}")]
    UnknownType(String),
}
