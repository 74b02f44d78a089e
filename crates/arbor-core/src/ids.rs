//! Branded ID newtypes for type safety.
//!
//! Every entity in the arbor system has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing a
//! session ID where an event ID is expected.
//!
//! IDs are short opaque strings: a type prefix followed by a UUID v7
//! (time-ordered). Creation order within a session is given by the event
//! `sequence` column, never by lexicographic ID comparison.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (`prefix_<uuidv7>`).
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// The wire prefix for this ID kind (e.g. `"evt"`).
            #[must_use]
            pub fn prefix() -> &'static str {
                $prefix
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a workspace (project directory).
    WorkspaceId, "ws"
}

branded_id! {
    /// Unique identifier for a session.
    SessionId, "sess"
}

branded_id! {
    /// Unique identifier for a persisted event.
    EventId, "evt"
}

branded_id! {
    /// Unique identifier for a stored blob (large payload).
    BlobId, "blob"
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
