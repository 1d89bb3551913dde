//! Typed identifiers for workspaces, blocks, and variables.
//!
//! Ids are opaque strings on the wire: persisted documents carry whatever ids
//! the producing editor chose, so parsing never rejects a non-UUID id. Freshly
//! generated ids are UUIDv7 in simple (32 hex chars, no hyphens) form, which
//! keeps them time-ordered and safe to embed in JSON keys and log lines.
//!
//! The `short()` form (first 8 chars) is for human-facing output only, never
//! used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A block identifier, unique within one workspace.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

/// A variable identifier, unique within one workspace's variable map.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(String);

/// A workspace identifier (stamped on every fired event).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

/// An event group identifier. Events sharing a group undo as one step.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Generate a fresh time-ordered ID (UUIDv7, simple form).
            pub fn generate() -> Self {
                Self(uuid::Uuid::now_v7().as_simple().to_string())
            }

            /// Wrap an existing id string verbatim.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the underlying string.
            pub fn into_string(self) -> String {
                self.0
            }

            /// First 8 characters, for human display only. Not for lookup.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((idx, _)) => &self.0[..idx],
                    None => &self.0,
                }
            }

            /// Check if this id is empty. Empty ids are never generated.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$T> for String {
            fn from(id: $T) -> String {
                id.0
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $T {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $T {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_string_id!(BlockId, "BlockId");
impl_string_id!(VariableId, "VariableId");
impl_string_id!(WorkspaceId, "WorkspaceId");
impl_string_id!(GroupId, "GroupId");

// ============================================================================
// Tests
// ============================================================================
