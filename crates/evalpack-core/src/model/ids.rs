// crates/evalpack-core/src/model/ids.rs
// ============================================================================
// Module: Evalpack Identifiers
// Description: Opaque, newtype-wrapped identifiers for evals, prompts, sessions.
// Purpose: Prevent accidental mixing of identifier kinds at call sites.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Session, prompt, and eval identifiers are opaque caller-supplied strings.
//! Wrapping them in distinct newtypes keeps `dispatch_turn(session_id, ...)`
//! from silently accepting a prompt id in the wrong position; the wire form
//! is a transparent string so existing JSON payloads are unaffected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Defines an opaque, transparently-serialized string identifier newtype.
macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true when the identifier is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_id!(SessionId, "Opaque session identifier, scoping turn/session evals.");
string_id!(PromptId, "Opaque prompt identifier, naming the pack+prompt config scope.");
string_id!(EvalId, "Opaque eval definition identifier, unique within its scope.");
