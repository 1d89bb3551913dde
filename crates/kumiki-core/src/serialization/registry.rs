//! Whole-workspace save and load.
//!
//! A workspace state is an ordered JSON object with one section per
//! registered [`Serializer`]. Sections are written in descending priority.
//! Loading clears every serializer in ascending priority, then loads the
//! sections present in descending priority, so variables exist before the
//! blocks that reference them.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use kumiki_types::{BlockState, BlocksState, WorkspaceState};

use crate::error::EngineError;
use crate::events::EventKind;
use crate::serialization::blocks::{self, SaveOptions};
use crate::serialization::is_truthy;
use crate::serialization::variables::VariableSerializer;
use crate::workspace::Workspace;
use crate::Result;

/// Built-in serializer priorities. Higher loads first.
pub mod priorities {
    pub const VARIABLES: i32 = 100;
    pub const BLOCKS: i32 = 50;
}

/// One named section of a workspace state.
pub trait Serializer: Send + Sync {
    fn priority(&self) -> i32;

    /// The section, or `None` if there is nothing to save.
    fn save(&self, workspace: &Workspace) -> Result<Option<Value>>;

    fn load(&self, state: &Value, workspace: &mut Workspace) -> Result<()>;

    /// Remove everything this serializer owns.
    fn clear(&self, workspace: &mut Workspace) -> Result<()>;
}

// ============================================================================
// Blocks
// ============================================================================

/// Saves and loads every top-level block tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockSerializer;

impl BlockSerializer {
    pub const NAME: &'static str = "blocks";
}

impl Serializer for BlockSerializer {
    fn priority(&self) -> i32 {
        priorities::BLOCKS
    }

    fn save(&self, workspace: &Workspace) -> Result<Option<Value>> {
        let options = SaveOptions {
            add_coordinates: true,
            do_full_serialization: false,
            ..Default::default()
        };
        let blocks: Vec<BlockState> = workspace
            .top_blocks(false)
            .iter()
            .filter_map(|id| workspace.block(id))
            .filter_map(|block| blocks::save(workspace, block, &options))
            .collect();
        if blocks.is_empty() {
            return Ok(None);
        }
        let state = BlocksState {
            language_version: 0,
            blocks,
        };
        Ok(Some(serde_json::to_value(state)?))
    }

    fn load(&self, state: &Value, workspace: &mut Workspace) -> Result<()> {
        // Statement stacks nest arbitrarily deep; grow the stack while decoding.
        let state = BlocksState::deserialize(serde_stacker::Deserializer::new(state)).map_err(|source| {
            EngineError::InvalidState {
                serializer: Self::NAME.to_string(),
                source,
            }
        })?;
        let record_undo = workspace.events().record_undo();
        for block in &state.blocks {
            blocks::append(block, workspace, record_undo)?;
        }
        Ok(())
    }

    fn clear(&self, workspace: &mut Workspace) -> Result<()> {
        for id in workspace.top_blocks(false) {
            workspace.dispose_block(&id, false)?;
        }
        Ok(())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Named serializers, in registration order.
pub struct SerializerRegistry {
    serializers: IndexMap<String, Box<dyn Serializer>>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.serializers.iter().map(|(name, s)| (name, s.priority())))
            .finish()
    }
}

impl SerializerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            serializers: IndexMap::new(),
        }
    }

    /// Variables and blocks.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .serializers
            .insert(VariableSerializer::NAME.to_string(), Box::new(VariableSerializer));
        registry
            .serializers
            .insert(BlockSerializer::NAME.to_string(), Box::new(BlockSerializer));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, serializer: Box<dyn Serializer>) -> Result<()> {
        let name = name.into();
        if self.serializers.contains_key(&name) {
            return Err(EngineError::DuplicateSerializer(name));
        }
        self.serializers.insert(name, serializer);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Serializer>> {
        self.serializers.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.serializers.contains_key(name)
    }

    /// Serializers sorted by priority, highest first. Ties keep registration
    /// order.
    fn by_priority(&self) -> Vec<(&str, &dyn Serializer)> {
        let mut sorted: Vec<(&str, &dyn Serializer)> = self
            .serializers
            .iter()
            .map(|(name, s)| (name.as_str(), s.as_ref()))
            .collect();
        sorted.sort_by_key(|(_, s)| std::cmp::Reverse(s.priority()));
        sorted
    }

    /// Save every section that has something to say.
    #[tracing::instrument(skip_all, name = "workspace.save")]
    pub fn save_workspace(&self, workspace: &Workspace) -> Result<WorkspaceState> {
        let mut state = WorkspaceState::new();
        for (name, serializer) in self.by_priority() {
            if let Some(section) = serializer.save(workspace)? {
                state.insert(name.to_string(), section);
            }
        }
        Ok(state)
    }

    /// Replace the workspace's contents with `state`.
    ///
    /// All events share one group. Sections with no registered serializer
    /// are skipped with a warning.
    #[tracing::instrument(skip_all, name = "workspace.load")]
    pub fn load_workspace(&self, state: &WorkspaceState, workspace: &mut Workspace, record_undo: bool) -> Result<()> {
        for name in state.keys().filter(|name| !self.contains(name)) {
            tracing::warn!(section = %name, "no serializer registered for section");
        }

        let existing_group = workspace.events.group().cloned();
        if existing_group.is_none() {
            workspace.events.set_group(true);
        }
        let previous_record_undo = workspace.events.record_undo();
        workspace.events.set_record_undo(record_undo);

        let result = self.clear_then_load(state, workspace);

        workspace.events.set_group_id(existing_group);
        workspace.events.set_record_undo(previous_record_undo);
        result
    }

    fn clear_then_load(&self, state: &WorkspaceState, workspace: &mut Workspace) -> Result<()> {
        let ordered = self.by_priority();
        for (name, serializer) in ordered.iter().rev() {
            tracing::debug!(serializer = *name, "clearing");
            serializer.clear(workspace)?;
        }
        for (name, serializer) in &ordered {
            let Some(section) = state.get(*name).filter(|v| is_truthy(v)) else {
                continue;
            };
            tracing::debug!(serializer = *name, "loading");
            serializer.load(section, workspace)?;
        }
        workspace.fire(EventKind::FinishedLoading);
        Ok(())
    }
}

/// Save with the standard serializers.
pub fn save_workspace(workspace: &Workspace) -> Result<WorkspaceState> {
    SerializerRegistry::standard().save_workspace(workspace)
}

/// Load with the standard serializers.
pub fn load_workspace(state: &WorkspaceState, workspace: &mut Workspace, record_undo: bool) -> Result<()> {
    SerializerRegistry::standard().load_workspace(state, workspace, record_undo)
}
