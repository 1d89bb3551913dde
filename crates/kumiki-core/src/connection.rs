//! Connections between blocks.
//!
//! A [`Connection`] lives on its source block (as the output, previous, next,
//! or an input's connection). Connected pairs point at each other through
//! [`ConnectionRef`]s, so the arena never holds references into itself.
//!
//! Superior connections (value inputs, next, statement inputs) additionally
//! carry an optional stored *shadow state*: the default block to show when no
//! real child is attached. The live shadow block, if any, is an ordinary arena
//! block flagged `is_shadow` and attached to the connection.

use std::fmt;

use kumiki_types::{BlockId, BlockState, ConnectionType};

use crate::block::Block;
use crate::error::EngineError;
use crate::serialization::blocks::{self, AppendOptions, SaveOptions};
use crate::workspace::Workspace;
use crate::Result;

/// Where on a block a connection lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionSlot {
    Output,
    Previous,
    Next,
    /// The connection owned by the named input.
    Input(String),
}

impl fmt::Display for ConnectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSlot::Output => f.write_str("output"),
            ConnectionSlot::Previous => f.write_str("previous"),
            ConnectionSlot::Next => f.write_str("next"),
            ConnectionSlot::Input(name) => write!(f, "input \"{name}\""),
        }
    }
}

/// Address of one connection in a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionRef {
    pub block: BlockId,
    pub slot: ConnectionSlot,
}

impl ConnectionRef {
    pub fn new(block: BlockId, slot: ConnectionSlot) -> Self {
        Self { block, slot }
    }

    pub fn output(block: &BlockId) -> Self {
        Self::new(block.clone(), ConnectionSlot::Output)
    }

    pub fn previous(block: &BlockId) -> Self {
        Self::new(block.clone(), ConnectionSlot::Previous)
    }

    pub fn next(block: &BlockId) -> Self {
        Self::new(block.clone(), ConnectionSlot::Next)
    }

    pub fn input(block: &BlockId, name: impl Into<String>) -> Self {
        Self::new(block.clone(), ConnectionSlot::Input(name.into()))
    }
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of block {}", self.slot, self.block)
    }
}

/// A typed link point on a block.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    kind: ConnectionType,
    check: Option<Vec<String>>,
    target: Option<ConnectionRef>,
    shadow_state: Option<BlockState>,
}

impl Connection {
    pub fn new(kind: ConnectionType, check: Option<Vec<String>>) -> Self {
        Self {
            kind,
            check,
            target: None,
            shadow_state: None,
        }
    }

    pub fn kind(&self) -> ConnectionType {
        self.kind
    }

    /// Type-check list. `None` accepts anything.
    pub fn check(&self) -> Option<&[String]> {
        self.check.as_deref()
    }

    pub fn set_check(&mut self, check: Option<Vec<String>>) {
        self.check = check;
    }

    /// The connection on the other block, if connected.
    pub fn target(&self) -> Option<&ConnectionRef> {
        self.target.as_ref()
    }

    /// The block on the other end, if connected.
    pub fn target_block(&self) -> Option<&BlockId> {
        self.target.as_ref().map(|t| &t.block)
    }

    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_superior(&self) -> bool {
        self.kind.is_superior()
    }

    /// Stored shadow state, ignoring any live shadow block.
    pub fn stored_shadow_state(&self) -> Option<&BlockState> {
        self.shadow_state.as_ref()
    }

    /// Check list in the `A,B` form used by checker messages (`null` if open).
    pub(crate) fn check_label(&self) -> String {
        match &self.check {
            Some(check) => check.join(","),
            None => "null".to_string(),
        }
    }
}

// ============================================================================
// Workspace: linking
// ============================================================================

impl Workspace {
    /// Look up a connection.
    pub fn connection(&self, at: &ConnectionRef) -> Result<&Connection> {
        self.get_block(&at.block)?
            .connection(&at.slot)
            .ok_or_else(|| EngineError::ConnectionNotFound(at.clone()))
    }

    pub(crate) fn connection_mut(&mut self, at: &ConnectionRef) -> Result<&mut Connection> {
        self.get_block_mut(&at.block)?
            .connection_mut(&at.slot)
            .ok_or_else(|| EngineError::ConnectionNotFound(at.clone()))
    }

    /// The block attached to a connection, if any.
    pub fn target_block(&self, at: &ConnectionRef) -> Result<Option<BlockId>> {
        Ok(self.connection(at)?.target_block().cloned())
    }

    /// Human-readable description: `Input "A" connection on "t" block (id="x")`.
    pub fn describe_connection(&self, at: &ConnectionRef) -> String {
        let Some(block) = self.block(&at.block) else {
            return "Orphan Connection".to_string();
        };
        let prefix = match &at.slot {
            ConnectionSlot::Output => "Output Connection of ".to_string(),
            ConnectionSlot::Previous => "Previous Connection of ".to_string(),
            ConnectionSlot::Next => "Next Connection of ".to_string(),
            ConnectionSlot::Input(name) => format!("Input \"{name}\" connection on "),
        };
        format!("{prefix}{}", block.label())
    }

    /// Connect two connections, superior side first or not.
    ///
    /// Returns whether the two ended up connected to each other. A rejected
    /// connection leaves both sides untouched and returns `false`.
    pub fn connect(&mut self, a: &ConnectionRef, b: &ConnectionRef) -> Result<bool> {
        if self.connection(a)?.target() == Some(b) {
            return Ok(true);
        }
        let checker = self.checker();
        if checker.can_connect(self, a, b, false) {
            let opened_group = self.events.group().is_none();
            if opened_group {
                self.events.set_group(true);
            }
            let result = if self.connection(a)?.is_superior() {
                self.connect_superior(a, b)
            } else {
                self.connect_superior(b, a)
            };
            if opened_group {
                self.events.set_group(false);
            }
            result?;
        }
        Ok(self.connection(a)?.target() == Some(b))
    }

    /// Attach `child` to `parent`, displacing whatever the parent holds.
    ///
    /// A displaced shadow is disposed (its state stays stored). A displaced
    /// real block becomes an orphan and is re-attached further down the new
    /// child if a unique compatible spot exists, otherwise left top-level.
    fn connect_superior(&mut self, parent: &ConnectionRef, child: &ConnectionRef) -> Result<()> {
        if self.connection(child)?.is_connected() {
            self.disconnect(child)?;
        }

        let mut orphan = None;
        if let Some(displaced) = self.target_block(parent)? {
            let stashed = self.stash_shadow_state(parent)?;
            if self.get_block(&displaced)?.is_shadow() {
                self.dispose_block(&displaced, false)?;
            } else {
                self.disconnect(parent)?;
                orphan = Some(displaced);
            }
            self.connection_mut(parent)?.shadow_state = stashed;
        }

        self.link(parent, child)?;

        if let Some(orphan) = orphan {
            self.rehome_orphan(parent, &child.block, &orphan)?;
        }
        Ok(())
    }

    fn rehome_orphan(&mut self, parent: &ConnectionRef, new_child: &BlockId, orphan: &BlockId) -> Result<()> {
        let orphan_conn = if self.connection(parent)?.kind() == ConnectionType::InputValue {
            ConnectionRef::output(orphan)
        } else {
            ConnectionRef::previous(orphan)
        };
        match self.connection_for_orphan(new_child, &orphan_conn)? {
            Some(home) => {
                self.connect(&orphan_conn, &home)?;
            }
            None => {
                tracing::debug!(orphan = %orphan, "no home for orphaned block, leaving it top-level");
            }
        }
        Ok(())
    }

    /// The spot on `start`'s subtree that will take an orphaned connection.
    fn connection_for_orphan(&self, start: &BlockId, orphan: &ConnectionRef) -> Result<Option<ConnectionRef>> {
        let checker = self.checker();
        if self.connection(orphan)?.kind() == ConnectionType::OutputValue {
            let mut current = start.clone();
            while let Some(candidate) = self.single_value_connection(&current, orphan) {
                match self.target_block(&candidate)? {
                    Some(next) if !self.get_block(&next)?.is_shadow() => current = next,
                    _ => return Ok(Some(candidate)),
                }
            }
            return Ok(None);
        }
        Ok(self
            .last_connection_in_stack(start, true)
            .filter(|last| checker.can_connect(self, orphan, last, false)))
    }

    /// The only input on `block` that `orphan` could plug into.
    fn single_value_connection(&self, block: &BlockId, orphan: &ConnectionRef) -> Option<ConnectionRef> {
        let checker = self.checker();
        let block = self.block(block)?;
        let mut found = None;
        for input in block.inputs() {
            if input.connection().is_none() {
                continue;
            }
            let candidate = ConnectionRef::input(block.id(), input.name());
            if checker.can_connect(self, orphan, &candidate, false) {
                if found.is_some() {
                    return None;
                }
                found = Some(candidate);
            }
        }
        found
    }

    /// Walk the next-chain to the first free next connection.
    pub fn last_connection_in_stack(&self, start: &BlockId, ignore_shadows: bool) -> Option<ConnectionRef> {
        let mut current = start.clone();
        loop {
            let next = self.block(&current)?.next_connection()?;
            match next.target_block() {
                Some(child) if !(ignore_shadows && self.block(child).is_some_and(Block::is_shadow)) => {
                    current = child.clone();
                }
                _ => return Some(ConnectionRef::next(&current)),
            }
        }
    }

    /// Break the link at `at`. Detaching a real child respawns the stored
    /// shadow.
    pub fn disconnect(&mut self, at: &ConnectionRef) -> Result<()> {
        let other = self
            .connection(at)?
            .target()
            .cloned()
            .ok_or_else(|| EngineError::NotConnected(at.clone()))?;
        let (parent, child) = if self.connection(at)?.is_superior() {
            (at.clone(), other)
        } else {
            (other, at.clone())
        };

        let opened_group = self.events.group().is_none();
        if opened_group {
            self.events.set_group(true);
        }
        self.unlink(&parent, &child)?;
        let result = if self.get_block(&child.block)?.is_shadow() {
            Ok(())
        } else {
            self.respawn_shadow(&parent).map(|_| ())
        };
        if opened_group {
            self.events.set_group(false);
        }
        result
    }

    fn link(&mut self, parent: &ConnectionRef, child: &ConnectionRef) -> Result<()> {
        self.connection_mut(parent)?.target = Some(child.clone());
        self.connection_mut(child)?.target = Some(parent.clone());
        Ok(())
    }

    fn unlink(&mut self, parent: &ConnectionRef, child: &ConnectionRef) -> Result<()> {
        self.connection_mut(parent)?.target = None;
        self.connection_mut(child)?.target = None;
        Ok(())
    }
}

// ============================================================================
// Workspace: shadow state
// ============================================================================

impl Workspace {
    /// The connection's shadow state.
    ///
    /// With `return_current`, a live shadow child is re-saved so edits made to
    /// it are reflected; otherwise the stored state is returned.
    pub fn shadow_state(&self, at: &ConnectionRef, return_current: bool) -> Result<Option<BlockState>> {
        let conn = self.connection(at)?;
        if return_current {
            if let Some(child) = conn.target_block().and_then(|id| self.block(id)) {
                if child.is_shadow() {
                    return Ok(blocks::save(self, child, &SaveOptions::default()));
                }
            }
        }
        Ok(conn.shadow_state.clone())
    }

    /// Install (or clear, with `None`) the connection's shadow state.
    ///
    /// - nothing attached: spawn the shadow and attach it;
    /// - a shadow attached: dispose it and spawn the new one;
    /// - a real block attached: build the shadow detached to validate it,
    ///   store its saved state, and dispose it again.
    pub fn set_shadow_state(&mut self, at: &ConnectionRef, state: Option<BlockState>) -> Result<()> {
        self.connection_mut(at)?.shadow_state = state;

        match self.target_block(at)? {
            None => self.respawn_and_store(at),
            Some(child) if self.get_block(&child)?.is_shadow() => {
                self.dispose_block(&child, false)?;
                self.respawn_and_store(at)
            }
            Some(_) => {
                self.events.disable();
                let built = self.create_shadow_block(at, false);
                self.events.enable();
                if let Some(shadow) = built? {
                    self.store_shadow(at, &shadow)?;
                    self.events.disable();
                    let disposed = self.dispose_block(&shadow, false);
                    self.events.enable();
                    disposed?;
                }
                Ok(())
            }
        }
    }

    fn respawn_and_store(&mut self, at: &ConnectionRef) -> Result<()> {
        self.respawn_shadow(at)?;
        if let Some(child) = self.target_block(at)? {
            if self.get_block(&child)?.is_shadow() {
                self.store_shadow(at, &child)?;
            }
        }
        Ok(())
    }

    fn store_shadow(&mut self, at: &ConnectionRef, shadow: &BlockId) -> Result<()> {
        let state = blocks::save(self, self.get_block(shadow)?, &SaveOptions::default());
        self.connection_mut(at)?.shadow_state = state;
        Ok(())
    }

    /// Take the current shadow state, leaving none stored so nothing respawns.
    fn stash_shadow_state(&mut self, at: &ConnectionRef) -> Result<Option<BlockState>> {
        let state = self.shadow_state(at, true)?;
        self.connection_mut(at)?.shadow_state = None;
        Ok(state)
    }

    pub(crate) fn respawn_shadow(&mut self, at: &ConnectionRef) -> Result<Option<BlockId>> {
        self.create_shadow_block(at, true)
    }

    /// Build a shadow block from the stored state, optionally attaching it.
    fn create_shadow_block(&mut self, at: &ConnectionRef, attempt_to_connect: bool) -> Result<Option<BlockId>> {
        let Some(state) = self.connection(at)?.shadow_state.clone() else {
            return Ok(None);
        };
        let options = AppendOptions {
            parent_connection: attempt_to_connect.then(|| at.clone()),
            is_shadow: true,
            record_undo: false,
        };
        blocks::append_internal(&state, self, options).map(Some)
    }
}
