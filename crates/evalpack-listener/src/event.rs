// crates/evalpack-listener/src/event.rs
// ============================================================================
// Module: Evalpack Message-Created Event
// Description: Wire shape of the event the listener subscribes to.
// Purpose: Decode bus messages into the role/content pair the accumulator
//          and auto-dispatch logic need.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `{type: "message_created", session_id: string, data: {role, content}}`.
//! Unknown fields are tolerated; a payload whose `type` is not
//! `"message_created"`, or whose `session_id` is empty, is ignored by the
//! listener rather than rejected as malformed.

use serde::Deserialize;
use serde::Serialize;

/// Subject the listener subscribes to for message-lifecycle notifications.
pub const MESSAGE_CREATED_SUBJECT: &str = "message_created";

/// Expected `type` discriminator on a [`MessageCreatedEvent`].
pub const MESSAGE_CREATED_TYPE: &str = "message_created";

/// Wire shape of a message-creation notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageCreatedEvent {
    /// Event type discriminator; only `"message_created"` is acted on.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Session the message belongs to.
    #[serde(default)]
    pub session_id: String,
    /// Role/content payload of the created message.
    #[serde(default)]
    pub data: MessageData,
}

/// Role/content pair carried by a [`MessageCreatedEvent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageData {
    /// Message role (`"user"`, `"assistant"`, ...).
    #[serde(default)]
    pub role: String,
    /// Message content.
    #[serde(default)]
    pub content: String,
}

impl MessageCreatedEvent {
    /// Returns true when this event is a well-formed, actionable
    /// message-created notification: correct `type` and a non-empty
    /// `session_id`; events without a session id or with a non-matching
    /// `type` are ignored.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.event_type == MESSAGE_CREATED_TYPE && !self.session_id.is_empty()
    }

    /// Returns true when the message role is `"assistant"`.
    #[must_use]
    pub fn is_assistant_message(&self) -> bool {
        self.data.role == "assistant"
    }
}
