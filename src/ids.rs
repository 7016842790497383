//! Opaque identifiers and timestamp helpers shared across components.
//!
//! §3 says "all identifiers are opaque strings assigned at creation"; the
//! teacher assigns ids with `uuid::Uuid::new_v4().to_string()` throughout
//! (`core/session.rs`, `memory/store_graph.rs`). We keep that but wrap each
//! id family in its own newtype so a `JobId` can't be passed where a
//! `SessionId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(JobId);
opaque_id!(SessionId);
opaque_id!(MessageId);
opaque_id!(StudentId);
opaque_id!(ActivityId);
opaque_id!(CourseId);
opaque_id!(AuditId);

/// Absolute instant with nanosecond resolution, per §3's data-model note.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub fn now() -> Timestamp {
    chrono::Utc::now()
}
