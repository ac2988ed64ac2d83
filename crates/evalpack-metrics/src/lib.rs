// crates/evalpack-metrics/src/lib.rs
// ============================================================================
// Module: Evalpack Metrics Library
// Description: Public API surface for Prometheus-format metric recording.
// Purpose: Expose the metric collector and the ResultWriter implementations
//          that bridge it (and structured logging) to the dispatcher.
// Dependencies: crate::{collector, writer}
// ============================================================================

//! ## Overview
//! Evalpack metrics turns [`evalpack_core::EvalResult`] batches into
//! Prometheus text exposition output. [`collector::MetricCollector`] is the
//! process-local store; [`writer::MetricResultWriter`],
//! [`writer::MetadataResultWriter`], and [`writer::CompositeResultWriter`]
//! implement [`evalpack_core::ResultWriter`] so a dispatcher can forward
//! results here without a compile-time dependency in the other direction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod collector;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use collector::DEFAULT_BUCKETS;
pub use collector::DEFAULT_NAMESPACE;
pub use collector::MetricCollector;
pub use collector::MetricCollectorBuilder;
pub use collector::MetricError;
pub use writer::CompositeResultWriter;
pub use writer::MetadataResultWriter;
pub use writer::MetricResultWriter;
