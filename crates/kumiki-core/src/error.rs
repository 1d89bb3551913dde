//! Error types for the serialization engine and its collaborators.
//!
//! The first five variants are the load-time exception taxonomy: each one means
//! the persisted state and the live block schema disagree, and none of them is
//! recoverable by retrying. They carry the offending [`BlockState`] so callers
//! can surface exactly what failed to load.

use std::fmt;

use thiserror::Error;

use kumiki_types::{BlockId, BlockState};

use crate::connection::ConnectionRef;

/// Developer-facing description of a live block: `"type" block (id="...")`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLabel {
    pub block_type: String,
    pub id: BlockId,
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" block (id=\"{}\")", self.block_type, self.id)
    }
}

/// Errors that can occur while saving, loading, or editing a workspace.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The state has no `type` (or an empty one).
    #[error("expected to find a 'type' property, defining the block type")]
    MissingBlockType { state: Box<BlockState> },

    /// A named input, or the next/output/previous connection, does not exist
    /// on the live block.
    #[error("the block {block} is missing a(n) {connection} connection")]
    MissingConnection {
        connection: String,
        block: BlockLabel,
        state: Box<BlockState>,
    },

    /// The connection checker rejected an otherwise well-formed connection.
    #[error("the block {block} could not connect its {connection} to its parent, because: {reason}")]
    BadConnectionCheck {
        reason: String,
        connection: String,
        block: BlockLabel,
        state: Box<BlockState>,
    },

    /// A real block was defined as the child of a shadow block.
    #[error(
        "encountered a real block which is defined as a child of a shadow block; \
         shadow blocks may only have shadow children"
    )]
    RealChildOfShadow { state: Box<BlockState> },

    /// The state names an icon type nothing is registered for.
    #[error(
        "cannot add an icon of type '{icon_type}' to the block {block}, because there is \
         no icon registered with type '{icon_type}'"
    )]
    UnregisteredIcon {
        icon_type: String,
        block: BlockLabel,
        state: Box<BlockState>,
    },

    /// The block factory has no definition for this type.
    #[error("invalid block definition for type: {0}")]
    UnknownBlockType(String),

    /// A mutation hook rejected the extra state it was handed.
    #[error("invalid extra state for block type '{block_type}': {reason}")]
    InvalidExtraState { block_type: String, reason: String },

    /// Block not found in the workspace.
    #[error("block not found: {0:?}")]
    BlockNotFound(BlockId),

    /// Connection not found on its block.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionRef),

    /// Tried to disconnect a connection that has no target.
    #[error("connection is not connected: {0}")]
    NotConnected(ConnectionRef),

    /// Variable name/id collision.
    #[error("variable conflict: {0}")]
    VariableConflict(String),

    /// A serializer with this name is already registered.
    #[error("serializer already registered: {0}")]
    DuplicateSerializer(String),

    /// A serializer's section of a workspace state did not decode.
    #[error("invalid state for serializer '{serializer}': {source}")]
    InvalidState {
        serializer: String,
        #[source]
        source: serde_json::Error,
    },

    /// Block definition JSON did not decode.
    #[error("invalid block definitions: {0}")]
    Definitions(#[source] serde_json::Error),

    /// JSON encoding error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// The state that failed to load, for the load-time taxonomy variants.
    pub fn state(&self) -> Option<&BlockState> {
        match self {
            EngineError::MissingBlockType { state }
            | EngineError::MissingConnection { state, .. }
            | EngineError::BadConnectionCheck { state, .. }
            | EngineError::RealChildOfShadow { state }
            | EngineError::UnregisteredIcon { state, .. } => Some(state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> BlockLabel {
        BlockLabel {
            block_type: "text_print".into(),
            id: BlockId::from("p1"),
        }
    }

    #[test]
    fn test_missing_connection_message_names_block() {
        let err = EngineError::MissingConnection {
            connection: "output".into(),
            block: label(),
            state: Box::new(BlockState::new("text_print")),
        };
        assert_eq!(
            err.to_string(),
            "the block \"text_print\" block (id=\"p1\") is missing a(n) output connection"
        );
    }

    #[test]
    fn test_taxonomy_variants_expose_state() {
        let err = EngineError::RealChildOfShadow {
            state: Box::new(BlockState::new("logic_boolean")),
        };
        assert_eq!(err.state().unwrap().block_type, "logic_boolean");
        assert!(EngineError::UnknownBlockType("x".into()).state().is_none());
    }
}
