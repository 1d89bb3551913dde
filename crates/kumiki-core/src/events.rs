//! Workspace events, grouping, and undo/redo.
//!
//! Every workspace owns one [`EventCoordinator`]. It holds the three pieces of
//! ambient state the load engine toggles while it builds a tree:
//!
//! - an enable/disable **counter** (events fire only at zero),
//! - the current **group** (events sharing a group undo as one step),
//! - the **record-undo** flag (copied onto each event as it is fired).
//!
//! Fired events are appended to the log. Events that record undo are also
//! pushed on the undo stack, which clears the redo stack.

use kumiki_types::{BlockId, BlockState, GroupId, VariableId, WorkspaceId};

use crate::serialization::blocks::{self, SaveOptions};
use crate::workspace::Workspace;
use crate::Result;

/// What happened.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// A block tree was created. `ids` covers the block and its descendants.
    BlockCreate {
        block_id: BlockId,
        ids: Vec<BlockId>,
        state: BlockState,
        is_shadow: bool,
    },
    /// A block tree was disposed. `old_state` recreates it.
    BlockDelete {
        block_id: BlockId,
        ids: Vec<BlockId>,
        old_state: BlockState,
        is_shadow: bool,
    },
    VarCreate {
        var_id: VariableId,
        var_name: String,
        var_type: String,
    },
    VarDelete {
        var_id: VariableId,
        var_name: String,
        var_type: String,
    },
    /// A whole-workspace load finished.
    FinishedLoading,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::BlockCreate { .. } => "block_create",
            EventKind::BlockDelete { .. } => "block_delete",
            EventKind::VarCreate { .. } => "var_create",
            EventKind::VarDelete { .. } => "var_delete",
            EventKind::FinishedLoading => "finished_loading",
        }
    }

    /// Shadow churn and load markers never reach the undo stack.
    fn is_undoable(&self) -> bool {
        match self {
            EventKind::BlockCreate { is_shadow, .. } | EventKind::BlockDelete { is_shadow, .. } => !is_shadow,
            EventKind::VarCreate { .. } | EventKind::VarDelete { .. } => true,
            EventKind::FinishedLoading => false,
        }
    }
}

/// A fired event.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub workspace_id: WorkspaceId,
    pub group: Option<GroupId>,
    pub record_undo: bool,
}

/// Per-workspace event state.
#[derive(Debug)]
pub struct EventCoordinator {
    disabled: u32,
    group: Option<GroupId>,
    record_undo: bool,
    log: Vec<Event>,
    undo_stack: Vec<Event>,
    redo_stack: Vec<Event>,
}

impl Default for EventCoordinator {
    fn default() -> Self {
        Self {
            disabled: 0,
            group: None,
            record_undo: true,
            log: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }
}

impl EventCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.disabled == 0
    }

    pub fn disable(&mut self) {
        self.disabled += 1;
    }

    pub fn enable(&mut self) {
        self.disabled = self.disabled.saturating_sub(1);
    }

    pub fn group(&self) -> Option<&GroupId> {
        self.group.as_ref()
    }

    /// `true` starts a fresh group, `false` ends the current one.
    pub fn set_group(&mut self, start: bool) {
        self.group = start.then(GroupId::generate);
    }

    /// Restore a previously saved group.
    pub fn set_group_id(&mut self, group: Option<GroupId>) {
        self.group = group;
    }

    pub fn record_undo(&self) -> bool {
        self.record_undo
    }

    pub fn set_record_undo(&mut self, record_undo: bool) {
        self.record_undo = record_undo;
    }

    /// Stamp and record an event. No-op while disabled.
    pub(crate) fn fire(&mut self, workspace_id: &WorkspaceId, kind: EventKind) {
        if !self.is_enabled() {
            return;
        }
        let event = Event {
            record_undo: self.record_undo && kind.is_undoable(),
            kind,
            workspace_id: workspace_id.clone(),
            group: self.group.clone(),
        };
        tracing::trace!(event = event.kind.name(), group = ?event.group, "fire");
        if event.record_undo {
            self.undo_stack.push(event.clone());
            self.redo_stack.clear();
        }
        self.log.push(event);
    }

    pub fn log(&self) -> &[Event] {
        &self.log
    }

    /// Drain the log, leaving the undo/redo stacks untouched.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.log)
    }

    pub fn undo_stack(&self) -> &[Event] {
        &self.undo_stack
    }

    pub fn redo_stack(&self) -> &[Event] {
        &self.redo_stack
    }

    pub fn clear_undo(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Pop the newest event and the rest of its group off one stack, moving
    /// them (in popped order) onto the other.
    fn pop_group(&mut self, redo: bool) -> Vec<Event> {
        let (input, output) = if redo {
            (&mut self.redo_stack, &mut self.undo_stack)
        } else {
            (&mut self.undo_stack, &mut self.redo_stack)
        };
        let Some(first) = input.pop() else {
            return Vec::new();
        };
        let group = first.group.clone();
        let mut events = vec![first];
        if let Some(group) = group {
            while input.last().and_then(|e| e.group.as_ref()) == Some(&group) {
                if let Some(event) = input.pop() {
                    events.push(event);
                }
            }
        }
        output.extend(events.iter().cloned());
        events
    }
}

// ============================================================================
// Workspace integration
// ============================================================================

impl Workspace {
    /// Fire an event stamped with this workspace's id.
    pub(crate) fn fire(&mut self, kind: EventKind) {
        self.events.fire(&self.id, kind);
    }

    /// `BlockCreate` for a freshly built tree.
    pub(crate) fn fire_block_create(&mut self, block: &BlockId) -> Result<()> {
        if !self.events.is_enabled() {
            return Ok(());
        }
        let (state, is_shadow) = {
            let live = self.get_block(block)?;
            let options = SaveOptions {
                add_coordinates: true,
                ..Default::default()
            };
            (blocks::save(self, live, &options), live.is_shadow())
        };
        if let Some(state) = state {
            let ids = self.descendants(block);
            self.fire(EventKind::BlockCreate {
                block_id: block.clone(),
                ids,
                state,
                is_shadow,
            });
        }
        Ok(())
    }

    /// Undo (or with `redo`, redo) the most recent event group.
    pub fn undo(&mut self, redo: bool) -> Result<()> {
        let events = self.events.pop_group(redo);
        if events.is_empty() {
            return Ok(());
        }
        tracing::debug!(redo, count = events.len(), "replaying event group");
        let previous = self.events.record_undo();
        self.events.set_record_undo(false);
        let result = events.iter().try_for_each(|event| self.run_event(&event.kind, redo));
        self.events.set_record_undo(previous);
        result
    }

    /// Apply an event forward (redo) or backward (undo).
    fn run_event(&mut self, kind: &EventKind, forward: bool) -> Result<()> {
        match kind {
            EventKind::BlockCreate { state, .. } if forward => {
                blocks::append(state, self, false).map(|_| ())
            }
            EventKind::BlockDelete { old_state, .. } if !forward => {
                blocks::append(old_state, self, false).map(|_| ())
            }
            EventKind::BlockCreate { block_id, ids, .. } | EventKind::BlockDelete { block_id, ids, .. } => {
                for id in ids {
                    if self.block(id).is_some() {
                        self.dispose_block(id, false)?;
                    } else if id == block_id {
                        tracing::warn!(block = %id, "can't dispose block that no longer exists");
                    }
                }
                Ok(())
            }
            EventKind::VarCreate { var_id, var_name, var_type } if forward => {
                self.create_variable(var_name, var_type, Some(var_id.clone())).map(|_| ())
            }
            EventKind::VarDelete { var_id, var_name, var_type } if !forward => {
                self.create_variable(var_name, var_type, Some(var_id.clone())).map(|_| ())
            }
            EventKind::VarCreate { var_id, .. } | EventKind::VarDelete { var_id, .. } => {
                self.delete_variable(var_id)
            }
            EventKind::FinishedLoading => Ok(()),
        }
    }
}
