// crates/evalpack-listener/src/lib.rs
// ============================================================================
// Module: Evalpack Listener Library
// Description: Public API surface for the event-driven eval listener.
// Purpose: Expose the session accumulator, the pack-eval-loader contract,
//          the message-created event shape, and the listener itself.
// Dependencies: crate::{accumulator, event, listener, loader}
// ============================================================================

//! ## Overview
//! Evalpack listener turns a stream of `message_created` events into
//! turn/session eval dispatches: [`accumulator::SessionAccumulator`] holds
//! per-session message history with TTL eviction,
//! [`listener::EventBusEvalListener`] wires that to a
//! [`evalpack_dispatch::Dispatcher`] and a [`loader::PackEvalLoader`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod accumulator;
pub mod event;
pub mod listener;
pub mod loader;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use accumulator::SessionAccumulator;
pub use event::MESSAGE_CREATED_SUBJECT;
pub use event::MESSAGE_CREATED_TYPE;
pub use event::MessageCreatedEvent;
pub use event::MessageData;
pub use listener::DEFAULT_CLEANUP_INTERVAL;
pub use listener::DEFAULT_TTL;
pub use listener::EventBusEvalListener;
pub use listener::ListenerError;
pub use loader::LoaderError;
pub use loader::PackEvalLoader;
