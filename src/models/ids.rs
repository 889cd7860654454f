// Typed identifiers for show-structure entities

//! # Identifiers
//!
//! Every entity is keyed by an opaque string. Wrapping each kind in its own
//! newtype keeps a `PartId` from being passed where a `SegmentId` is expected.
//!
//! ## Rust Learning Notes:
//!
//! ### Declarative Macros
//! The five id types share the exact same surface (`new`, `as_str`, `From`,
//! `Display`), so a `macro_rules!` generates them instead of five copies.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like input
            pub fn new<S: Into<String>>(id: S) -> Self {
                $name(id.into())
            }

            /// Get the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Identifies one show
    RundownId
);
string_id!(
    /// Identifies a segment within a rundown
    SegmentId
);
string_id!(
    /// Identifies a part within a segment
    PartId
);
string_id!(
    /// Identifies a piece within a part
    PieceId
);
string_id!(
    /// Identifies a persisted action
    ActionId
);
