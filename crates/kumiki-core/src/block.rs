//! Live blocks.
//!
//! A [`Block`] is one node of the editable forest. Blocks are owned by the
//! [`Workspace`](crate::Workspace) arena and refer to each other only through
//! ids carried by their connections, so the forest can be walked and rewired
//! without shared ownership.

use indexmap::IndexSet;

use kumiki_types::{BlockId, ConnectionType, InputType};

use crate::connection::{Connection, ConnectionRef, ConnectionSlot};
use crate::definition::{BlockDefinition, InputDefinition};
use crate::error::BlockLabel;
use crate::field::{Field, FieldDefinition};
use crate::icon::Icon;

/// Disabled reason recorded for the legacy `enabled: false` attribute.
pub const MANUALLY_DISABLED: &str = "MANUALLY_DISABLED";

/// Workspace coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Render bookkeeping for blocks on a rendered workspace.
///
/// Nothing here draws; it records what a renderer would have been asked to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderState {
    pub svg_initialized: bool,
    pub render_queued: bool,
    pub rendered: bool,
    /// Whether the block's connections are registered for proximity lookups.
    pub connection_tracking: bool,
}

/// One input row: leading fields plus an optional connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Input {
    name: String,
    kind: InputType,
    connection: Option<Connection>,
    fields: Vec<Field>,
}

impl Input {
    pub fn new(name: impl Into<String>, kind: InputType, check: Option<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            kind,
            connection: kind.connection_type().map(|ct| Connection::new(ct, check)),
            fields: Vec::new(),
        }
    }

    pub fn from_definition(def: &InputDefinition) -> Self {
        let mut input = Self::new(def.name.clone(), def.kind, def.check.clone().map(|c| c.into_vec()));
        input.fields = def.fields.iter().map(Field::from_definition).collect();
        input
    }

    pub fn with_field(mut self, def: &FieldDefinition) -> Self {
        self.fields.push(Field::from_definition(def));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> InputType {
        self.kind
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// A live block.
#[derive(Clone, Debug)]
pub struct Block {
    id: BlockId,
    serial: u64,
    block_type: String,
    is_shadow: bool,
    is_insertion_marker: bool,
    position: Coordinate,
    collapsed: bool,
    disabled_reasons: IndexSet<String>,
    deletable: bool,
    movable: bool,
    editable: bool,
    inputs_inline: Option<bool>,
    inputs_inline_default: Option<bool>,
    data: Option<String>,
    output: Option<Connection>,
    previous: Option<Connection>,
    next: Option<Connection>,
    inputs: Vec<Input>,
    icons: Vec<Icon>,
    initialized: bool,
    render: RenderState,
}

impl Block {
    /// Build a bare block from its type definition. Not yet in any workspace.
    pub(crate) fn from_definition(def: &BlockDefinition, id: BlockId, serial: u64) -> Self {
        let check = |spec: &Option<Option<crate::definition::CheckSpec>>| {
            spec.as_ref().map(|c| c.clone().map(|c| c.into_vec()))
        };
        Self {
            id,
            serial,
            block_type: def.block_type.clone(),
            is_shadow: false,
            is_insertion_marker: false,
            position: Coordinate::default(),
            collapsed: false,
            disabled_reasons: IndexSet::new(),
            deletable: true,
            movable: true,
            editable: true,
            inputs_inline: def.inputs_inline,
            inputs_inline_default: def.inputs_inline,
            data: None,
            output: check(&def.output).map(|c| Connection::new(ConnectionType::OutputValue, c)),
            previous: check(&def.previous_statement)
                .map(|c| Connection::new(ConnectionType::PreviousStatement, c)),
            next: check(&def.next_statement).map(|c| Connection::new(ConnectionType::NextStatement, c)),
            inputs: def.inputs.iter().map(Input::from_definition).collect(),
            icons: Vec::new(),
            initialized: false,
            render: RenderState::default(),
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    /// Creation serial, unique per workspace even when ids are reused.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    pub fn label(&self) -> BlockLabel {
        BlockLabel {
            block_type: self.block_type.clone(),
            id: self.id.clone(),
        }
    }

    // ── Flags ───────────────────────────────────────────────────────────────

    pub fn is_shadow(&self) -> bool {
        self.is_shadow
    }

    pub fn set_shadow(&mut self, shadow: bool) {
        self.is_shadow = shadow;
    }

    pub fn is_insertion_marker(&self) -> bool {
        self.is_insertion_marker
    }

    pub fn set_insertion_marker(&mut self, marker: bool) {
        self.is_insertion_marker = marker;
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn set_collapsed(&mut self, collapsed: bool) {
        self.collapsed = collapsed;
    }

    pub fn is_enabled(&self) -> bool {
        self.disabled_reasons.is_empty()
    }

    pub fn disabled_reasons(&self) -> impl Iterator<Item = &str> {
        self.disabled_reasons.iter().map(String::as_str)
    }

    /// Add or remove one reason for the block being disabled.
    pub fn set_disabled_reason(&mut self, disabled: bool, reason: &str) {
        if disabled {
            self.disabled_reasons.insert(reason.to_string());
        } else {
            self.disabled_reasons.shift_remove(reason);
        }
    }

    /// The block's own deletable flag (not accounting for shadows).
    pub fn is_own_deletable(&self) -> bool {
        self.deletable
    }

    pub fn set_deletable(&mut self, deletable: bool) {
        self.deletable = deletable;
    }

    pub fn is_own_movable(&self) -> bool {
        self.movable
    }

    /// Shadows follow their parent and are never independently movable.
    pub fn is_movable(&self) -> bool {
        self.movable && !self.is_shadow
    }

    pub fn set_movable(&mut self, movable: bool) {
        self.movable = movable;
    }

    pub fn is_own_editable(&self) -> bool {
        self.editable
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    pub fn inputs_inline(&self) -> Option<bool> {
        self.inputs_inline
    }

    pub fn inputs_inline_default(&self) -> Option<bool> {
        self.inputs_inline_default
    }

    pub fn set_inputs_inline(&mut self, inline: bool) {
        self.inputs_inline = Some(inline);
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn set_data(&mut self, data: Option<String>) {
        self.data = data;
    }

    // ── Position ────────────────────────────────────────────────────────────

    pub fn position(&self) -> Coordinate {
        self.position
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) {
        self.position.x += dx;
        self.position.y += dy;
    }

    // ── Connections ─────────────────────────────────────────────────────────

    pub fn output_connection(&self) -> Option<&Connection> {
        self.output.as_ref()
    }

    pub fn previous_connection(&self) -> Option<&Connection> {
        self.previous.as_ref()
    }

    pub fn next_connection(&self) -> Option<&Connection> {
        self.next.as_ref()
    }

    pub fn connection(&self, slot: &ConnectionSlot) -> Option<&Connection> {
        match slot {
            ConnectionSlot::Output => self.output.as_ref(),
            ConnectionSlot::Previous => self.previous.as_ref(),
            ConnectionSlot::Next => self.next.as_ref(),
            ConnectionSlot::Input(name) => self.input(name).and_then(Input::connection),
        }
    }

    pub(crate) fn connection_mut(&mut self, slot: &ConnectionSlot) -> Option<&mut Connection> {
        match slot {
            ConnectionSlot::Output => self.output.as_mut(),
            ConnectionSlot::Previous => self.previous.as_mut(),
            ConnectionSlot::Next => self.next.as_mut(),
            ConnectionSlot::Input(name) => self
                .inputs
                .iter_mut()
                .find(|i| i.name == *name)
                .and_then(|i| i.connection.as_mut()),
        }
    }

    /// Every connection on the block with its slot: output, previous, inputs
    /// in order, then next.
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionSlot, &Connection)> {
        let own = [
            (ConnectionSlot::Output, self.output.as_ref()),
            (ConnectionSlot::Previous, self.previous.as_ref()),
        ];
        let inputs = self
            .inputs
            .iter()
            .map(|i| (ConnectionSlot::Input(i.name.clone()), i.connection.as_ref()));
        own.into_iter()
            .chain(inputs)
            .chain([(ConnectionSlot::Next, self.next.as_ref())])
            .filter_map(|(slot, conn)| conn.map(|c| (slot, c)))
    }

    /// The superior connection this block hangs from.
    pub fn parent(&self) -> Option<&ConnectionRef> {
        self.output
            .as_ref()
            .or(self.previous.as_ref())
            .and_then(Connection::target)
    }

    pub fn parent_block(&self) -> Option<&BlockId> {
        self.parent().map(|p| &p.block)
    }

    /// Blocks attached below this one: input children in order, then next.
    pub fn children(&self) -> Vec<BlockId> {
        self.inputs
            .iter()
            .filter_map(|i| i.connection.as_ref())
            .chain(self.next.as_ref())
            .filter_map(|c| c.target_block().cloned())
            .collect()
    }

    // ── Inputs and fields ───────────────────────────────────────────────────

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Append an input row. Used by mutation hooks to reshape the block.
    pub fn append_input(&mut self, input: Input) {
        self.inputs.push(input);
    }

    /// Remove an input row. Hooks only call this on blocks whose children
    /// have not been attached yet.
    pub fn remove_input(&mut self, name: &str) -> Option<Input> {
        let index = self.inputs.iter().position(|i| i.name == name)?;
        Some(self.inputs.remove(index))
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.inputs.iter().flat_map(|i| i.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|f| f.name() == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.inputs
            .iter_mut()
            .flat_map(|i| i.fields.iter_mut())
            .find(|f| f.name() == name)
    }

    // ── Icons ───────────────────────────────────────────────────────────────

    pub fn icons(&self) -> &[Icon] {
        &self.icons
    }

    pub fn icon(&self, icon_type: &str) -> Option<&Icon> {
        self.icons.iter().find(|i| i.icon_type() == icon_type)
    }

    pub(crate) fn icons_mut(&mut self) -> &mut [Icon] {
        &mut self.icons
    }

    pub fn icon_mut(&mut self, icon_type: &str) -> Option<&mut Icon> {
        self.icons.iter_mut().find(|i| i.icon_type() == icon_type)
    }

    /// Add an icon, replacing any existing icon of the same type.
    pub fn add_icon(&mut self, icon: Icon) {
        match self.icons.iter_mut().find(|i| i.icon_type() == icon.icon_type()) {
            Some(existing) => *existing = icon,
            None => self.icons.push(icon),
        }
    }

    pub fn remove_icon(&mut self, icon_type: &str) -> Option<Icon> {
        let index = self.icons.iter().position(|i| i.icon_type() == icon_type)?;
        Some(self.icons.remove(index))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render
    }

    pub(crate) fn render_state_mut(&mut self) -> &mut RenderState {
        &mut self.render
    }
}
