//! Shared identity and State Model types for kumiki.
//!
//! This crate is the persisted vocabulary of the editor: typed ids, connection
//! kinds, and the plain serde structs that a block tree serializes to. It has
//! **no internal kumiki dependencies**. It is a pure leaf crate that the engine and
//! the CLI build on.
//!
//! # Key Types
//!
//! |---------------------|-------------------------------------------------|
//! | Type                | Purpose                                         |
//! |---------------------|-------------------------------------------------|
//! | [`BlockId`]         | Block address within one workspace              |
//! | [`VariableId`]      | Variable address within one workspace           |
//! | [`BlockState`]      | Serialized block (recursive)                    |
//! | [`ConnectionState`] | Serialized connection: shadow and/or child      |
//! | [`BlocksState`]     | All top-level blocks of a workspace             |
//! | [`VariableState`]   | Serialized variable                             |
//! | [`ConnectionType`]  | Input/output/next/previous                      |
//! |---------------------|-------------------------------------------------|

pub mod ids;
pub mod kinds;
pub mod state;

// Re-export primary types at crate root for convenience.
pub use ids::{BlockId, GroupId, VariableId, WorkspaceId};
pub use kinds::{ConnectionType, InputType};
pub use state::{from_json_str, BlockState, BlocksState, ConnectionState, VariableState, WorkspaceState};
