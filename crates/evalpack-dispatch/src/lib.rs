// crates/evalpack-dispatch/src/lib.rs
// ============================================================================
// Module: Evalpack Dispatch Library
// Description: Public API surface for dispatch placement and the event bus.
// Purpose: Expose the Dispatcher trait and its three variants, the event
//          payload wire format, and the symmetric eval worker.
// Dependencies: crate::{bus, dispatcher, payload, worker}
// ============================================================================

//! ## Overview
//! Evalpack dispatch wires `evalpack-core`'s runner to three interchangeable
//! deployment placements: in-process, event-bus publisher, and
//! no-op, plus the symmetric [`worker::EvalWorker`] that consumes
//! Event-dispatched payloads on the other side of the bus.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bus;
pub mod dispatcher;
pub mod payload;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bus::BusError;
pub use bus::BusMessage;
pub use bus::MessageHandler;
pub use bus::Publisher;
pub use bus::Subscriber;
#[cfg(feature = "test-utils")]
pub use bus::InMemoryBus;
pub use dispatcher::DispatchError;
pub use dispatcher::Dispatcher;
pub use dispatcher::EventDispatcher;
pub use dispatcher::InProcDispatcher;
pub use dispatcher::NoOpDispatcher;
pub use payload::EventPayload;
pub use payload::Scope;
pub use payload::subject_for;
pub use payload::wildcard_subject_for;
pub use worker::EvalWorker;
pub use worker::WorkerError;
