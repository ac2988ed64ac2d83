// crates/evalpack-core/src/cancel.rs
// ============================================================================
// Module: Evalpack Cancellation
// Description: Lightweight, clonable cancellation signal for the runner.
// Purpose: Let a caller stop a dispatch call between definitions without
//          pulling an async runtime into this crate.
// Dependencies: std::sync
// ============================================================================

//! ## Overview
//! `evalpack-core` has no async runtime dependency, so
//! cancellation is a plain `Arc<AtomicBool>` the runner polls between
//! definitions. `evalpack-dispatch`/`evalpack-listener` bridge this to
//! `tokio_util::sync::CancellationToken` at the async boundary.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// A shareable, one-shot cancellation flag.
///
/// # Invariants
/// - Once set, `is_cancelled` never reports `false` again for any clone.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Creates a fresh, not-yet-cancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as cancelled. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel` has been called on any clone of this
    /// signal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
