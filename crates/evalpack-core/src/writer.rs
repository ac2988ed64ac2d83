// crates/evalpack-core/src/writer.rs
// ============================================================================
// Module: Evalpack Result Writer Contract
// Description: Narrow interface dispatchers forward results through.
// Purpose: Let the dispatcher hand results to metrics/metadata writers
//          without this crate depending on `evalpack-metrics`.
// Dependencies: crate::model, thiserror
// ============================================================================

//! ## Overview
//! [`ResultWriter`] is the seam the dispatcher (in `evalpack-dispatch`) calls
//! through; concrete writers (`MetricResultWriter`, `MetadataResultWriter`,
//! `CompositeResultWriter`) live in `evalpack-metrics`, avoiding a dependency
//! cycle between the two crates: state objects never hold back-pointers to
//! their owning registries.

use thiserror::Error;

use crate::model::EvalResult;

/// Errors returned by a [`ResultWriter`].
#[derive(Debug, Error)]
pub enum WriterError {
    /// The writer failed to record one or more results.
    #[error("result writer failed: {0}")]
    Failed(String),
}

/// Receives a batch of results produced by one dispatch call.
///
/// # Invariants
/// - Implementations must not mutate the results they are handed; the
///   dispatcher still returns the original list to its own caller.
pub trait ResultWriter: Send + Sync {
    /// Records `results`.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError`] when recording fails. A writer error does not
    /// imply the results were lost to the dispatcher's caller.
    fn write_results(&self, results: &[EvalResult]) -> Result<(), WriterError>;
}
