//! Block-tree serialization engine for kumiki.
//!
//! Converts live block trees to and from the JSON State Model defined in
//! `kumiki-types`, and whole workspaces to and from prioritized sections.
//!
//! # Layout
//!
//! - [`workspace`]: the block arena and the collaborators the engine drives
//!   (definitions, icons, connection checker, variables, events, tasks).
//! - [`serialization::blocks`]: recursive save and load of one tree.
//! - [`serialization::registry`]: whole-workspace save and load.
//! - [`standard`]: the built-in block set.
//!
//! # Load semantics
//!
//! A tree is built with events disabled, depth-first: extra state before
//! children, the parent connection before the block's own fields, shadows
//! before real children. When construction finishes, one `VarCreate` per new
//! variable fires, then a single `BlockCreate` for the top block, all in one
//! event group.
//!
//! # Failure
//!
//! A malformed state aborts the load with an [`EngineError`] carrying the
//! offending state. Blocks already built stay in the workspace; event and
//! undo flags are always restored.

pub mod block;
pub mod checker;
pub mod connection;
pub mod definition;
mod error;
pub mod events;
pub mod field;
pub mod icon;
pub mod serialization;
pub mod standard;
pub mod tasks;
pub mod variables;
pub mod workspace;

pub use block::{Block, Coordinate, Input, MANUALLY_DISABLED};
pub use checker::{ConnectionCheck, ConnectionChecker, TypeChecker};
pub use connection::{Connection, ConnectionRef, ConnectionSlot};
pub use definition::{BlockDefinition, BlockRegistry, ExtraStateHook, MutationHook, XmlMutationHook};
pub use error::{BlockLabel, EngineError};
pub use events::{Event, EventKind};
pub use icon::{Icon, IconKind, IconRegistry};
pub use serialization::{
    append, append_internal, load_workspace, save, save_workspace, AppendOptions, BlockSerializer, SaveOptions,
    SerializerRegistry, VariableSerializer,
};
pub use standard::{standard_registry, standard_workspace};
pub use variables::VariableModel;
pub use workspace::{Workspace, WorkspaceOptions};

pub use kumiki_types;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
