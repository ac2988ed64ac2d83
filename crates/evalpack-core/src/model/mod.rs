// crates/evalpack-core/src/model/mod.rs
// ============================================================================
// Module: Evalpack Data Model
// Description: Re-exports for the core data types.
// Purpose: Single import surface for definitions, context, and results.
// Dependencies: none (aggregator module)
// ============================================================================

//! ## Overview
//! Aggregates the core data types: identifiers,
//! definitions, context, and results. Downstream crates import through
//! `evalpack_core::model::*` or the crate-root re-exports.

pub mod context;
pub mod def;
pub mod ids;
pub mod result;

pub use context::EvalContext;
pub use context::Message;
pub use context::ToolCallRecord;
pub use def::DEFAULT_SAMPLE_PERCENTAGE;
pub use def::EvalDef;
pub use def::MetricDef;
pub use def::MetricRange;
pub use def::MetricType;
pub use def::Threshold;
pub use def::Trigger;
pub use def::When;
pub use ids::EvalId;
pub use ids::PromptId;
pub use ids::SessionId;
pub use result::EvalResult;
