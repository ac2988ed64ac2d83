// crates/evalpack-dispatch/src/bus.rs
// ============================================================================
// Module: Evalpack Event Bus Contract
// Description: Abstract publish/subscribe interface the Event dispatcher and
//              worker are wired to.
// Purpose: Keep the eval subsystem transport-agnostic; the concrete bus is
//          an external collaborator.
// Dependencies: async_trait, thiserror, tokio (test-utils only)
// ============================================================================

//! ## Overview
//! [`Publisher`] and [`Subscriber`] are the two halves of the event-bus
//! contract: fire-and-forget publish, and a blocking subscription that
//! invokes a handler once per message until cancelled. The concrete
//! transport is explicitly out of scope for this workspace; the `test-utils`
//! feature ships [`InMemoryBus`] as an in-process stand-in, mirroring this
//! codebase's `test-utils`-gated in-memory doubles.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Errors returned by [`Publisher::publish`] or [`Subscriber::subscribe`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The publish call failed.
    #[error("event bus publish failed: {0}")]
    Publish(String),
    /// The subscription ended due to a fatal transport error.
    #[error("event bus subscription failed: {0}")]
    Subscribe(String),
}

/// A single message delivered to a [`Subscriber`] handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Subject the message was published on.
    pub subject: String,
    /// Raw message body.
    pub data: Vec<u8>,
}

/// Fire-and-forget publisher half of the event-bus contract.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `data` on `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Publish`] when the transport rejects the message.
    async fn publish(&self, subject: &str, data: Vec<u8>) -> Result<(), BusError>;
}

/// Per-message handler invoked by a [`Subscriber`].
pub type MessageHandler = Box<dyn Fn(BusMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Blocking subscription half of the event-bus contract.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribes to `subject_pattern`, invoking `handler` once per message
    /// until the subscription is cancelled or a fatal transport error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Subscribe`] on a fatal transport error.
    async fn subscribe(&self, subject_pattern: &str, handler: MessageHandler) -> Result<(), BusError>;
}

// ============================================================================
// SECTION: In-Memory Test Double
// ============================================================================

#[cfg(feature = "test-utils")]
pub use in_memory::InMemoryBus;

#[cfg(feature = "test-utils")]
mod in_memory {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;

    use tokio::sync::broadcast;

    use super::BusError;
    use super::BusMessage;
    use super::MessageHandler;
    use super::Publisher;
    use super::Subscriber;

    /// In-process pub/sub standing in for the abstract event-bus transport,
    /// used by this crate's own tests and exported for downstream
    /// integration tests. Every publish goes through a single broadcast
    /// channel; each subscriber filters incoming messages against its own
    /// subject pattern (subjects like `eval.turn.<session_id>`, worker
    /// patterns like `eval.turn.*`), so a single-segment trailing wildcard
    /// subscription observes every publish under that prefix regardless of
    /// subscribe/publish ordering.
    #[derive(Clone)]
    pub struct InMemoryBus {
        sender: broadcast::Sender<BusMessage>,
        sequence: Arc<AtomicU64>,
    }

    impl Default for InMemoryBus {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryBus {
        /// Creates an empty in-memory bus.
        #[must_use]
        pub fn new() -> Self {
            Self {
                sender: broadcast::channel(1024).0,
                sequence: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Monotonic sequence number of the last published message, for
        /// diagnostic ordering assertions in tests.
        #[must_use]
        pub fn published_count(&self) -> u64 {
            self.sequence.load(Ordering::SeqCst)
        }
    }

    /// Matches `subject` against `pattern`, where a trailing `.*` in
    /// `pattern` matches any single remaining segment (the only wildcard
    /// shape this workspace's subject scheme ever produces, e.g.
    /// `eval.turn.*` against `eval.turn.session-123`). Any other pattern is
    /// matched literally.
    fn subject_matches(pattern: &str, subject: &str) -> bool {
        pattern.strip_suffix('*').map_or(pattern == subject, |prefix| subject.starts_with(prefix) && !subject[prefix.len() ..].contains('.'))
    }

    #[async_trait::async_trait]
    impl Publisher for InMemoryBus {
        async fn publish(&self, subject: &str, data: Vec<u8>) -> Result<(), BusError> {
            self.sequence.fetch_add(1, Ordering::SeqCst);
            // No receivers yet is not an error: fire-and-forget semantics.
            let _ = self.sender.send(BusMessage {
                subject: subject.to_string(),
                data,
            });
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Subscriber for InMemoryBus {
        async fn subscribe(&self, subject_pattern: &str, handler: MessageHandler) -> Result<(), BusError> {
            let mut receiver = self.sender.subscribe();
            let pattern = subject_pattern.to_string();
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if subject_matches(&pattern, &message.subject) {
                            handler(message).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
    }

}

#[cfg(all(test, feature = "test-utils"))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "test-only assertions")]

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = InMemoryBus::new();
        let result = bus.publish("eval.turn.s1", b"{}".to_vec()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = InMemoryBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        let bus_clone = bus.clone();

        let subscriber = tokio::spawn(async move {
            let _ = bus_clone
                .subscribe(
                    "eval.turn.s1",
                    Box::new(move |_msg| {
                        received_clone.fetch_add(1, Ordering::SeqCst);
                        Box::pin(async {})
                    }),
                )
                .await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        bus.publish("eval.turn.s1", b"{}".to_vec()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        subscriber.abort();

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
