//! The workspace: block arena, collaborators, and lifecycle.
//!
//! A [`Workspace`] owns every live block in an [`IndexMap`] keyed by id, in
//! creation order. It also owns the collaborators the load engine drives: the
//! block definition registry (the factory), the icon registry, the connection
//! checker, the variable map, the event coordinator, and the deferred task
//! queue.
//!
//! Connection, variable, event, and task behavior is implemented next to
//! those types (`impl Workspace` blocks in their own modules); this module
//! covers construction, lookup, tree walks, and disposal.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use kumiki_types::{BlockId, ConnectionType, WorkspaceId};

use crate::block::Block;
use crate::checker::{ConnectionChecker, TypeChecker};
use crate::connection::ConnectionRef;
use crate::definition::BlockRegistry;
use crate::error::EngineError;
use crate::events::{EventCoordinator, EventKind};
use crate::icon::IconRegistry;
use crate::serialization::blocks::{self, SaveOptions};
use crate::tasks::TaskQueue;
use crate::variables::VariableMap;
use crate::Result;

/// Workspace-wide settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceOptions {
    /// Right-to-left layout: x coordinates are mirrored against `width`.
    pub rtl: bool,
    /// Workspace width used for RTL mirroring.
    pub width: f64,
    /// Interactive (rendered) workspace rather than headless.
    pub rendered: bool,
}

/// A collection of block trees plus everything needed to build them.
pub struct Workspace {
    pub(crate) id: WorkspaceId,
    pub(crate) options: WorkspaceOptions,
    pub(crate) definitions: Arc<BlockRegistry>,
    pub(crate) icon_registry: Arc<IconRegistry>,
    pub(crate) checker: Arc<dyn ConnectionChecker>,
    pub(crate) blocks: IndexMap<BlockId, Block>,
    next_serial: u64,
    pub(crate) variables: VariableMap,
    pub(crate) events: EventCoordinator,
    pub(crate) tasks: TaskQueue,
    pub(crate) render_queue: IndexSet<BlockId>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("blocks", &self.blocks.len())
            .field("variables", &self.variables.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Workspace {
    /// Create an empty workspace with the standard icons and type checker.
    pub fn new(options: WorkspaceOptions, definitions: Arc<BlockRegistry>) -> Self {
        Self {
            id: WorkspaceId::generate(),
            options,
            definitions,
            icon_registry: Arc::new(IconRegistry::standard()),
            checker: Arc::new(TypeChecker),
            blocks: IndexMap::new(),
            next_serial: 0,
            variables: VariableMap::new(),
            events: EventCoordinator::new(),
            tasks: TaskQueue::default(),
            render_queue: IndexSet::new(),
        }
    }

    /// Replace the icon registry.
    pub fn with_icons(mut self, icons: Arc<IconRegistry>) -> Self {
        self.icon_registry = icons;
        self
    }

    /// Replace the connection checker.
    pub fn with_checker(mut self, checker: Arc<dyn ConnectionChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    pub fn options(&self) -> &WorkspaceOptions {
        &self.options
    }

    pub fn is_rendered(&self) -> bool {
        self.options.rendered
    }

    pub fn is_rtl(&self) -> bool {
        self.options.rtl
    }

    pub fn width(&self) -> f64 {
        self.options.width
    }

    pub fn definitions(&self) -> &BlockRegistry {
        &self.definitions
    }

    pub fn icon_registry(&self) -> &IconRegistry {
        &self.icon_registry
    }

    /// The connection checker. Returned as an owned handle so callers can
    /// consult it while mutating the workspace.
    pub fn checker(&self) -> Arc<dyn ConnectionChecker> {
        Arc::clone(&self.checker)
    }

    pub fn events(&self) -> &EventCoordinator {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventCoordinator {
        &mut self.events
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    // ========================================================================
    // Factory
    // ========================================================================

    /// Construct a block of `block_type`, detached and top-level.
    ///
    /// A requested id that is already taken is replaced with a fresh one.
    /// Fires `BlockCreate` when events are enabled.
    pub fn new_block(&mut self, block_type: &str, id: Option<&BlockId>) -> Result<BlockId> {
        let definition = self
            .definitions
            .get(block_type)
            .cloned()
            .ok_or_else(|| EngineError::UnknownBlockType(block_type.to_string()))?;

        let id = match id {
            Some(id) if !id.is_empty() && !self.blocks.contains_key(id) => id.clone(),
            Some(id) if !id.is_empty() => {
                let fresh = BlockId::generate();
                tracing::debug!(requested = %id, assigned = %fresh, "block id in use, assigning a fresh one");
                fresh
            }
            _ => BlockId::generate(),
        };

        self.next_serial += 1;
        let block = Block::from_definition(&definition, id.clone(), self.next_serial);
        self.blocks.insert(id.clone(), block);
        tracing::debug!(block = %id, block_type, "created block");

        if self.events.is_enabled() {
            let opened_group = self.events.group().is_none();
            if opened_group {
                self.events.set_group(true);
            }
            let fired = self.fire_block_create(&id);
            if opened_group {
                self.events.set_group(false);
            }
            fired?;
        }
        Ok(id)
    }

    // ========================================================================
    // Lookup and tree walks
    // ========================================================================

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn get_block(&self, id: &BlockId) -> Result<&Block> {
        self.blocks
            .get(id)
            .ok_or_else(|| EngineError::BlockNotFound(id.clone()))
    }

    pub fn get_block_mut(&mut self, id: &BlockId) -> Result<&mut Block> {
        self.blocks
            .get_mut(id)
            .ok_or_else(|| EngineError::BlockNotFound(id.clone()))
    }

    /// Every live block, in creation order.
    pub fn all_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks without a parent. With `ordered`, sorted top to bottom, then
    /// along the reading direction.
    pub fn top_blocks(&self, ordered: bool) -> Vec<BlockId> {
        let mut top: Vec<&Block> = self.blocks.values().filter(|b| b.parent().is_none()).collect();
        if ordered {
            let direction = if self.is_rtl() { -1.0 } else { 1.0 };
            top.sort_by(|a, b| {
                let (pa, pb) = (a.position(), b.position());
                pa.y.total_cmp(&pb.y)
                    .then((pa.x * direction).total_cmp(&(pb.x * direction)))
            });
        }
        top.into_iter().map(|b| b.id().clone()).collect()
    }

    /// `id` followed by every block below it, depth first.
    pub fn descendants(&self, id: &BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let Some(block) = self.blocks.get(&current) else {
                continue;
            };
            stack.extend(block.children().into_iter().rev());
            out.push(current);
        }
        out
    }

    // ========================================================================
    // Disposal
    // ========================================================================

    /// Remove a block and everything below it.
    ///
    /// With `heal`, the gap is closed: a value block's only attached child
    /// moves up into the parent input, and a statement's next block is
    /// reattached to the previous block.
    pub fn dispose_block(&mut self, id: &BlockId, heal: bool) -> Result<()> {
        if !self.blocks.contains_key(id) {
            return Ok(());
        }
        self.unplug(id, heal)?;

        if self.events.is_enabled() {
            let block = self.get_block(id)?;
            let options = SaveOptions {
                add_coordinates: true,
                ..Default::default()
            };
            let is_shadow = block.is_shadow();
            if let Some(old_state) = blocks::save(self, block, &options) {
                let ids = self.descendants(id);
                self.fire(EventKind::BlockDelete {
                    block_id: id.clone(),
                    ids,
                    old_state,
                    is_shadow,
                });
            }
        }

        let doomed = self.descendants(id);
        for block in &doomed {
            self.blocks.shift_remove(block);
            self.render_queue.shift_remove(block);
        }
        tracing::debug!(block = %id, count = doomed.len(), "disposed block tree");
        Ok(())
    }

    /// Detach a block from its parent, optionally healing the gap.
    fn unplug(&mut self, id: &BlockId, heal: bool) -> Result<()> {
        let block = self.get_block(id)?;
        if block.output_connection().is_some() {
            self.unplug_from_row(id, heal)
        } else if block.previous_connection().is_some() {
            self.unplug_from_stack(id, heal)
        } else {
            Ok(())
        }
    }

    fn unplug_from_row(&mut self, id: &BlockId, heal: bool) -> Result<()> {
        let output = ConnectionRef::output(id);
        let Some(parent) = self.connection(&output)?.target().cloned() else {
            return Ok(());
        };
        self.disconnect(&output)?;
        if !heal {
            return Ok(());
        }
        let Some(through) = self.only_value_connection(id) else {
            return Ok(());
        };
        let Some(child) = self.target_block(&through)? else {
            return Ok(());
        };
        if self.get_block(&child)?.is_shadow() {
            return Ok(());
        }
        let child_output = ConnectionRef::output(&child);
        self.disconnect(&child_output)?;
        if self.checker().can_connect(self, &child_output, &parent, false) {
            self.connect(&parent, &child_output)?;
        }
        Ok(())
    }

    fn unplug_from_stack(&mut self, id: &BlockId, heal: bool) -> Result<()> {
        let previous = ConnectionRef::previous(id);
        let previous_target = self.connection(&previous)?.target().cloned();
        if previous_target.is_some() {
            self.disconnect(&previous)?;
        }
        if !heal {
            return Ok(());
        }
        let next = ConnectionRef::next(id);
        let Some(next_block) = self.get_block(id)?.next_connection().and_then(|c| c.target_block().cloned())
        else {
            return Ok(());
        };
        if self.get_block(&next_block)?.is_shadow() {
            return Ok(());
        }
        self.disconnect(&next)?;
        let next_previous = ConnectionRef::previous(&next_block);
        if let Some(previous_target) = previous_target {
            if self.checker().can_connect(self, &previous_target, &next_previous, false) {
                self.connect(&previous_target, &next_previous)?;
            }
        }
        Ok(())
    }

    /// The block's single occupied value input, if it has exactly one.
    fn only_value_connection(&self, id: &BlockId) -> Option<ConnectionRef> {
        let block = self.block(id)?;
        let mut found = None;
        for input in block.inputs() {
            let Some(conn) = input.connection() else {
                continue;
            };
            if conn.kind() == ConnectionType::InputValue && conn.is_connected() {
                if found.is_some() {
                    return None;
                }
                found = Some(ConnectionRef::input(id, input.name()));
            }
        }
        found
    }

    /// Dispose every top-level block and every variable.
    pub fn clear(&mut self) -> Result<()> {
        let opened_group = self.events.group().is_none();
        if opened_group {
            self.events.set_group(true);
        }
        let result = self.clear_in_group();
        if opened_group {
            self.events.set_group(false);
        }
        result
    }

    fn clear_in_group(&mut self) -> Result<()> {
        for id in self.top_blocks(false) {
            self.dispose_block(&id, false)?;
        }
        self.clear_variables()
    }

    // ========================================================================
    // Initialization and render bookkeeping
    // ========================================================================

    /// Headless initialization: resolve variable fields.
    pub fn init_model(&mut self, id: &BlockId) -> Result<()> {
        if self.get_block(id)?.is_initialized() {
            return Ok(());
        }
        self.init_variable_fields(id)?;
        self.get_block_mut(id)?.mark_initialized();
        Ok(())
    }

    /// Rendered initialization: everything `init_model` does, plus marking
    /// the block's view as built.
    pub fn init_svg(&mut self, id: &BlockId) -> Result<()> {
        self.init_model(id)?;
        self.get_block_mut(id)?.render_state_mut().svg_initialized = true;
        Ok(())
    }

    /// Ask for a block to be rendered on the next render pass.
    pub fn queue_render(&mut self, id: &BlockId) -> Result<()> {
        self.get_block_mut(id)?.render_state_mut().render_queued = true;
        self.render_queue.insert(id.clone());
        Ok(())
    }

    /// Run the render pass. Returns how many blocks were rendered.
    pub fn trigger_queued_renders(&mut self) -> usize {
        let queued: Vec<BlockId> = self.render_queue.drain(..).collect();
        let mut rendered = 0;
        for id in queued {
            if let Some(block) = self.blocks.get_mut(&id) {
                let render = block.render_state_mut();
                render.render_queued = false;
                render.rendered = true;
                rendered += 1;
            }
        }
        rendered
    }

    /// Tell a block's icons where the block now sits.
    pub(crate) fn update_icon_locations(&mut self, id: &BlockId) -> Result<()> {
        let block = self.get_block_mut(id)?;
        let at = block.position();
        for icon in block.icons_mut() {
            icon.on_location_change(at);
        }
        Ok(())
    }
}
