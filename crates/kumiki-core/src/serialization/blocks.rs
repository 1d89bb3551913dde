//! Block tree save and load.
//!
//! [`save`] walks a live block and its children into a [`BlockState`].
//! [`append`] walks a [`BlockState`] back into live blocks. The two are
//! mirror images: the shape of the state always matches the shape of the
//! tree it came from.
//!
//! # Event contract
//!
//! Loading a tree fires, in order:
//!
//! 1. one `VarCreate` per variable the load introduced (creation order),
//! 2. exactly one `BlockCreate` for the top block,
//!
//! all in one event group, however deep the tree is. Events are disabled
//! while the tree is built and re-enabled before the summary events fire,
//! including when construction fails.

use indexmap::IndexMap;
use serde_json::Value;

use kumiki_types::{BlockId, BlockState, ConnectionState, ConnectionType, VariableId};

use crate::block::{Block, MANUALLY_DISABLED};
use crate::connection::{Connection, ConnectionRef};
use crate::definition::MutationHook;
use crate::error::EngineError;
use crate::events::EventKind;
use crate::serialization::is_truthy;
use crate::tasks::TaskAction;
use crate::variables::{added_variables, all_variables, VariableModel};
use crate::workspace::Workspace;
use crate::Result;

/// Namespace attribute legacy mutation XML carries, stripped on save.
pub const XML_NAMESPACE_ATTRIBUTE: &str = " xmlns=\"https://developers.google.com/blockly/xml\"";

// ============================================================================
// Save
// ============================================================================

/// What [`save`] includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    /// Emit `x`/`y`.
    pub add_coordinates: bool,
    /// Recurse into inputs.
    pub add_input_blocks: bool,
    /// Recurse into the next block.
    pub add_next_blocks: bool,
    /// Save everything needed to recreate the block elsewhere (e.g. full
    /// variable descriptions instead of bare ids).
    pub do_full_serialization: bool,
    /// Emit block ids.
    pub save_ids: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            add_coordinates: false,
            add_input_blocks: true,
            add_next_blocks: true,
            do_full_serialization: true,
            save_ids: true,
        }
    }
}

/// Serialize a block and (per `options`) everything below it.
///
/// Returns `None` for insertion markers. Input children recurse; the `next`
/// chain is walked in a loop, so stacks of any length save in constant
/// stack depth.
pub fn save(workspace: &Workspace, block: &Block, options: &SaveOptions) -> Option<BlockState> {
    if block.is_insertion_marker() {
        return None;
    }

    let child_options = child_save_options(options);
    // Each block on the stack, plus the shadow held by its next connection.
    let mut links: Vec<(BlockState, Option<BlockState>)> = Vec::new();
    let mut current = block;
    let mut current_options = options;
    loop {
        let state = save_block(workspace, current, current_options);
        if !current_options.add_next_blocks {
            links.push((state, None));
            break;
        }
        let Some((shadow, child)) = next_link(workspace, current) else {
            links.push((state, None));
            break;
        };
        let following = child.filter(|c| !c.is_shadow() && !c.is_insertion_marker());
        links.push((state, shadow));
        match following {
            Some(next) => {
                current = next;
                current_options = &child_options;
            }
            None => break,
        }
    }

    let mut tail: Option<BlockState> = None;
    for (mut state, shadow) in links.into_iter().rev() {
        let connection = ConnectionState {
            shadow: shadow.map(Box::new),
            block: tail.take().map(Box::new),
        };
        if !connection.is_empty() {
            state.next = Some(Box::new(connection));
        }
        tail = Some(state);
    }
    tail
}

/// Options for children: only the serialization depth and ids carry over.
fn child_save_options(options: &SaveOptions) -> SaveOptions {
    SaveOptions {
        do_full_serialization: options.do_full_serialization,
        save_ids: options.save_ids,
        ..Default::default()
    }
}

/// One block with its inputs, without its `next` chain.
fn save_block(workspace: &Workspace, block: &Block, options: &SaveOptions) -> BlockState {
    let mut state = BlockState::new(block.block_type());
    if options.save_ids {
        state.id = Some(block.id().clone());
    }
    if options.add_coordinates {
        save_coords(workspace, block, &mut state);
    }
    save_attributes(block, &mut state);
    save_extra_state(workspace, block, &mut state, options.do_full_serialization);
    save_icons(block, &mut state);
    save_fields(workspace, block, &mut state, options.do_full_serialization);
    if options.add_input_blocks {
        save_input_blocks(workspace, block, &mut state, options);
    }
    state
}

/// The shadow state and attached child of a block's next connection, or
/// `None` if the block has no next connection.
fn next_link<'a>(workspace: &'a Workspace, block: &Block) -> Option<(Option<BlockState>, Option<&'a Block>)> {
    let conn = block.next_connection()?;
    let at = ConnectionRef::next(block.id());
    let shadow = workspace.shadow_state(&at, true).ok().flatten();
    let child = conn.target_block().and_then(|id| workspace.block(id));
    Some((shadow, child))
}

/// Round half up, as editors round coordinates.
fn round_coordinate(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

fn save_coords(workspace: &Workspace, block: &Block, state: &mut BlockState) {
    let at = block.position();
    let x = if workspace.is_rtl() { workspace.width() - at.x } else { at.x };
    state.x = Some(round_coordinate(x));
    state.y = Some(round_coordinate(at.y));
}

/// Attributes are only written when they differ from the default.
fn save_attributes(block: &Block, state: &mut BlockState) {
    if block.is_collapsed() {
        state.collapsed = Some(true);
    }
    if !block.is_enabled() {
        state.disabled_reasons = Some(block.disabled_reasons().map(str::to_string).collect());
    }
    if !block.is_own_deletable() {
        state.deletable = Some(false);
    }
    if !block.is_own_movable() {
        state.movable = Some(false);
    }
    if !block.is_own_editable() {
        state.editable = Some(false);
    }
    if let Some(inline) = block.inputs_inline() {
        if Some(inline) != block.inputs_inline_default() {
            state.inline = Some(inline);
        }
    }
    if let Some(data) = block.data().filter(|d| !d.is_empty()) {
        state.data = Some(data.to_string());
    }
}

fn save_extra_state(workspace: &Workspace, block: &Block, state: &mut BlockState, full: bool) {
    state.extra_state = match workspace.definitions().hook_for(block.block_type()) {
        Some(MutationHook::ExtraState(hook)) => hook.save_extra_state(block, full).filter(|v| !v.is_null()),
        Some(MutationHook::Xml(hook)) => hook
            .mutation_to_dom(block)
            .map(|xml| Value::String(xml.replace(XML_NAMESPACE_ATTRIBUTE, ""))),
        None => None,
    };
}

fn save_icons(block: &Block, state: &mut BlockState) {
    let icons: IndexMap<String, Value> = block
        .icons()
        .iter()
        .filter(|icon| icon.is_serializable())
        .filter_map(|icon| icon.save_state().map(|s| (icon.icon_type().to_string(), s)))
        .collect();
    if !icons.is_empty() {
        state.icons = Some(icons);
    }
}

fn save_fields(workspace: &Workspace, block: &Block, state: &mut BlockState, full: bool) {
    let fields: IndexMap<String, Value> = block
        .fields()
        .filter(|field| field.is_serializable())
        .map(|field| (field.name().to_string(), field.save_state(workspace.variables(), full)))
        .collect();
    if !fields.is_empty() {
        state.fields = Some(fields);
    }
}

fn save_input_blocks(workspace: &Workspace, block: &Block, state: &mut BlockState, options: &SaveOptions) {
    let mut inputs = IndexMap::new();
    for input in block.inputs() {
        let Some(conn) = input.connection() else {
            continue;
        };
        let at = ConnectionRef::input(block.id(), input.name());
        if let Some(saved) = save_connection(workspace, &at, conn, options) {
            inputs.insert(input.name().to_string(), saved);
        }
    }
    if !inputs.is_empty() {
        state.inputs = Some(inputs);
    }
}

/// The shadow and/or real child held by a connection. `None` when it holds
/// neither, or only an unsaveable child.
fn save_connection(
    workspace: &Workspace,
    at: &ConnectionRef,
    conn: &Connection,
    options: &SaveOptions,
) -> Option<ConnectionState> {
    let shadow = workspace.shadow_state(at, true).ok().flatten();
    let child = conn.target_block().and_then(|id| workspace.block(id));
    if shadow.is_none() && child.is_none() {
        return None;
    }

    let child_options = child_save_options(options);
    let block = child
        .filter(|c| !c.is_shadow())
        .and_then(|c| save(workspace, c, &child_options));

    let state = ConnectionState {
        shadow: shadow.map(Box::new),
        block: block.map(Box::new),
    };
    (!state.is_empty()).then_some(state)
}

// ============================================================================
// Load
// ============================================================================

/// Extra parameters for [`append_internal`].
#[derive(Clone, Debug, Default)]
pub struct AppendOptions {
    /// Superior connection the new block attaches to.
    pub parent_connection: Option<ConnectionRef>,
    /// Build the block (and so its whole tree) as a shadow.
    pub is_shadow: bool,
    /// Whether the fired events are recorded for undo.
    pub record_undo: bool,
}

/// Load a block tree into the workspace as a new top-level tree.
pub fn append(state: &BlockState, workspace: &mut Workspace, record_undo: bool) -> Result<BlockId> {
    let options = AppendOptions {
        record_undo,
        ..Default::default()
    };
    let id = append_internal(state, workspace, options)?;
    if workspace.is_rendered() {
        workspace.trigger_queued_renders();
    }
    Ok(id)
}

/// Load a block tree, optionally attached to a parent connection or as a
/// shadow.
///
/// The group and record-undo flag are restored on every path. Blocks built
/// before a failure stay in the workspace.
#[tracing::instrument(skip_all, name = "blocks.append", fields(block_type = %state.block_type))]
pub fn append_internal(state: &BlockState, workspace: &mut Workspace, options: AppendOptions) -> Result<BlockId> {
    let existing_group = workspace.events.group().cloned();
    if existing_group.is_none() {
        workspace.events.set_group(true);
    }
    let previous_record_undo = workspace.events.record_undo();
    workspace.events.set_record_undo(options.record_undo);

    workspace.events.disable();
    let before = all_variables(workspace);
    let built = append_private(state, workspace, options.parent_connection.as_ref(), options.is_shadow);
    workspace.events.enable();

    let result = built.and_then(|id| fire_creation_events(workspace, &id, &before).map(|_| id));

    workspace.events.set_group_id(existing_group);
    workspace.events.set_record_undo(previous_record_undo);

    let id = result?;
    if workspace.is_rendered() {
        workspace.defer(&id, TaskAction::EnableConnectionTracking);
    }
    Ok(id)
}

/// Variables first, then the one block event.
fn fire_creation_events(workspace: &mut Workspace, id: &BlockId, before: &[VariableModel]) -> Result<()> {
    if !workspace.events.is_enabled() {
        return Ok(());
    }
    for variable in added_variables(workspace, before) {
        workspace.fire(EventKind::VarCreate {
            var_id: variable.id,
            var_name: variable.name,
            var_type: variable.var_type,
        });
    }
    workspace.fire_block_create(id)
}

/// Build one block and everything below it. Fires nothing itself.
///
/// Input children recurse; the `next` chain is built in a loop. Blocks are
/// initialized bottom-up once the whole chain is attached, the same order a
/// depth-first build would use.
fn append_private(
    state: &BlockState,
    workspace: &mut Workspace,
    parent: Option<&ConnectionRef>,
    is_shadow: bool,
) -> Result<BlockId> {
    let top = build_block(state, workspace, parent, is_shadow)?;
    let mut built = vec![top.clone()];
    let (mut id, mut current) = (top.clone(), state);
    while let Some(next) = &current.next {
        if workspace.get_block(&id)?.next_connection().is_none() {
            return Err(missing_connection(workspace, &id, "next", current));
        }
        let at = ConnectionRef::next(&id);
        if let Some(shadow) = &next.shadow {
            workspace.set_shadow_state(&at, Some(shadow.as_ref().clone()))?;
        }
        let Some(block) = next.block.as_deref() else {
            break;
        };
        id = build_block(block, workspace, Some(&at), false)?;
        built.push(id.clone());
        current = block;
    }

    for id in built.iter().rev() {
        init_block(workspace, id)?;
    }
    Ok(top)
}

/// One block with its attributes, parent connection, icons, fields and
/// inputs. Leaves the `next` chain and initialization to the caller.
fn build_block(
    state: &BlockState,
    workspace: &mut Workspace,
    parent: Option<&ConnectionRef>,
    is_shadow: bool,
) -> Result<BlockId> {
    if !state.has_type() {
        return Err(EngineError::MissingBlockType {
            state: Box::new(state.clone()),
        });
    }

    let id = workspace.new_block(&state.block_type, state.id.as_ref())?;
    workspace.get_block_mut(&id)?.set_shadow(is_shadow);

    load_coords(workspace, &id, state)?;
    load_attributes(workspace.get_block_mut(&id)?, state);
    load_extra_state(workspace, &id, state)?;
    try_to_connect_parent(workspace, parent, &id, state)?;
    load_icons(workspace, &id, state)?;
    load_fields(workspace, &id, state)?;
    load_input_blocks(workspace, &id, state)?;
    Ok(id)
}

fn load_coords(workspace: &mut Workspace, id: &BlockId, state: &BlockState) -> Result<()> {
    let x = state.x.unwrap_or(0) as f64;
    let y = state.y.unwrap_or(0) as f64;
    let x = if workspace.is_rtl() { workspace.width() - x } else { x };
    workspace.get_block_mut(id)?.move_by(x, y);
    Ok(())
}

fn load_attributes(block: &mut Block, state: &BlockState) {
    if state.collapsed == Some(true) {
        block.set_collapsed(true);
    }
    if state.deletable == Some(false) {
        block.set_deletable(false);
    }
    if state.movable == Some(false) {
        block.set_movable(false);
    }
    if state.editable == Some(false) {
        block.set_editable(false);
    }
    if state.enabled == Some(false) {
        block.set_disabled_reason(true, MANUALLY_DISABLED);
    }
    for reason in state.disabled_reasons.iter().flatten() {
        block.set_disabled_reason(true, reason);
    }
    if let Some(inline) = state.inline {
        block.set_inputs_inline(inline);
    }
    if let Some(data) = &state.data {
        block.set_data(Some(data.clone()));
    }
}

fn load_extra_state(workspace: &mut Workspace, id: &BlockId, state: &BlockState) -> Result<()> {
    let Some(extra) = state.extra_state.as_ref().filter(|v| is_truthy(v)) else {
        return Ok(());
    };
    match workspace.definitions.hook_for(&state.block_type) {
        Some(MutationHook::ExtraState(hook)) => hook.load_extra_state(workspace.get_block_mut(id)?, extra),
        Some(MutationHook::Xml(hook)) => {
            let xml = extra.as_str().ok_or_else(|| EngineError::InvalidExtraState {
                block_type: state.block_type.clone(),
                reason: "legacy mutation state must be XML text".to_string(),
            })?;
            hook.dom_to_mutation(workspace.get_block_mut(id)?, xml)
        }
        None => {
            tracing::warn!(block_type = %state.block_type, "ignoring extra state for block type without a mutation hook");
            Ok(())
        }
    }
}

fn missing_connection(workspace: &Workspace, id: &BlockId, connection: &str, state: &BlockState) -> EngineError {
    match workspace.get_block(id) {
        Ok(block) => EngineError::MissingConnection {
            connection: connection.to_string(),
            block: block.label(),
            state: Box::new(state.clone()),
        },
        Err(e) => e,
    }
}

fn try_to_connect_parent(
    workspace: &mut Workspace,
    parent: Option<&ConnectionRef>,
    child: &BlockId,
    state: &BlockState,
) -> Result<()> {
    let Some(parent) = parent else {
        return Ok(());
    };
    if workspace.get_block(&parent.block)?.is_shadow() && !workspace.get_block(child)?.is_shadow() {
        return Err(EngineError::RealChildOfShadow {
            state: Box::new(state.clone()),
        });
    }

    let (child_conn, name) = if workspace.connection(parent)?.kind() == ConnectionType::InputValue {
        (ConnectionRef::output(child), "output")
    } else {
        (ConnectionRef::previous(child), "previous")
    };
    if workspace.get_block(child)?.connection(&child_conn.slot).is_none() {
        return Err(missing_connection(workspace, child, name, state));
    }

    if !workspace.connect(parent, &child_conn)? {
        let checker = workspace.checker();
        let code = checker.can_connect_with_reason(workspace, &child_conn, parent, false);
        return Err(EngineError::BadConnectionCheck {
            reason: checker.error_message(workspace, code, &child_conn, parent),
            connection: format!("{name} connection"),
            block: workspace.get_block(child)?.label(),
            state: Box::new(state.clone()),
        });
    }
    Ok(())
}

fn load_icons(workspace: &mut Workspace, id: &BlockId, state: &BlockState) -> Result<()> {
    let Some(icons) = &state.icons else {
        return Ok(());
    };
    for (icon_type, icon_state) in icons {
        if workspace.get_block(id)?.icon(icon_type).is_none() {
            let Some(icon) = workspace.icon_registry.create(icon_type) else {
                return Err(EngineError::UnregisteredIcon {
                    icon_type: icon_type.clone(),
                    block: workspace.get_block(id)?.label(),
                    state: Box::new(state.clone()),
                });
            };
            workspace.get_block_mut(id)?.add_icon(icon);
        }

        let wants_bubble = match workspace.get_block_mut(id)?.icon_mut(icon_type) {
            Some(icon) if icon.is_serializable() => icon.load_state(icon_state),
            _ => false,
        };
        if wants_bubble {
            if workspace.is_rendered() {
                workspace.defer(id, TaskAction::ShowCommentBubble);
            } else if let Some(icon) = workspace.get_block_mut(id)?.icon_mut(icon_type) {
                icon.set_bubble_visible(true);
            }
        }
    }
    Ok(())
}

fn load_fields(workspace: &mut Workspace, id: &BlockId, state: &BlockState) -> Result<()> {
    let Some(fields) = &state.fields else {
        return Ok(());
    };
    for (name, value) in fields {
        let is_variable = match workspace.get_block(id)?.field(name) {
            Some(field) => field.kind().is_variable_reference(),
            None => {
                tracing::warn!(field = %name, block_type = %state.block_type, "ignoring non-existent field");
                continue;
            }
        };

        if is_variable {
            let variable = load_variable_reference(workspace, value)?;
            if let Some(field) = workspace.get_block_mut(id)?.field_mut(name) {
                field.set_variable_id(variable.id.as_str());
            }
            continue;
        }

        let accepted = workspace
            .get_block_mut(id)?
            .field_mut(name)
            .is_some_and(|field| field.set_value(value));
        if !accepted {
            tracing::warn!(field = %name, block_type = %state.block_type, %value, "field rejected value, keeping default");
        }
    }
    Ok(())
}

/// A variable field's state is `{"id", "name"?, "type"?}`, or a bare id.
fn load_variable_reference(workspace: &mut Workspace, value: &Value) -> Result<VariableModel> {
    let text = |key: &str| value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    let (id, name, var_type) = match value {
        Value::String(id) => (Some(id.as_str()), None, ""),
        _ => (text("id"), text("name"), text("type").unwrap_or("")),
    };
    let id = id.map(VariableId::from);
    workspace.get_or_create_variable(id.as_ref(), name, var_type)
}

fn load_input_blocks(workspace: &mut Workspace, id: &BlockId, state: &BlockState) -> Result<()> {
    let Some(inputs) = &state.inputs else {
        return Ok(());
    };
    for (name, conn_state) in inputs {
        let has_connection = workspace
            .get_block(id)?
            .input(name)
            .is_some_and(|input| input.connection().is_some());
        if !has_connection {
            return Err(missing_connection(workspace, id, name, state));
        }
        load_connection(workspace, &ConnectionRef::input(id, name.as_str()), conn_state)?;
    }
    Ok(())
}

/// Install a connection's shadow, then build and attach its real child.
pub(crate) fn load_connection(workspace: &mut Workspace, at: &ConnectionRef, state: &ConnectionState) -> Result<()> {
    if let Some(shadow) = &state.shadow {
        workspace.set_shadow_state(at, Some(shadow.as_ref().clone()))?;
    }
    if let Some(block) = &state.block {
        append_private(block, workspace, Some(at), false)?;
    }
    Ok(())
}

fn init_block(workspace: &mut Workspace, id: &BlockId) -> Result<()> {
    if !workspace.is_rendered() {
        return workspace.init_model(id);
    }
    workspace.get_block_mut(id)?.render_state_mut().connection_tracking = false;
    workspace.init_svg(id)?;
    workspace.queue_render(id)?;
    workspace.update_icon_locations(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icon::{Icon, COMMENT};
    use crate::standard::standard_workspace;
    use crate::workspace::WorkspaceOptions;
    use serde_json::json;

    #[test]
    fn test_minimal_state_has_only_type_id_and_fields() {
        let mut ws = standard_workspace().unwrap();
        let id = ws.new_block("logic_compare", Some(&"c1".into())).unwrap();
        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"type": "logic_compare", "id": "c1", "fields": {"OP": "EQ"}})
        );
    }

    #[test]
    fn test_attributes_only_when_not_default() {
        let mut ws = standard_workspace().unwrap();
        let id = ws.new_block("text_print", Some(&"p".into())).unwrap();
        {
            let block = ws.get_block_mut(&id).unwrap();
            block.set_collapsed(true);
            block.set_deletable(false);
            block.set_movable(false);
            block.set_editable(false);
            block.set_disabled_reason(true, MANUALLY_DISABLED);
            block.set_inputs_inline(true);
            block.set_data(Some("payload".into()));
        }
        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        assert_eq!(state.collapsed, Some(true));
        assert_eq!(state.deletable, Some(false));
        assert_eq!(state.movable, Some(false));
        assert_eq!(state.editable, Some(false));
        assert_eq!(state.disabled_reasons, Some(vec![MANUALLY_DISABLED.to_string()]));
        assert_eq!(state.inline, Some(true));
        assert_eq!(state.data.as_deref(), Some("payload"));
        assert_eq!(state.enabled, None);
    }

    #[test]
    fn test_inline_matching_type_default_is_omitted() {
        let mut ws = standard_workspace().unwrap();
        let id = ws.new_block("logic_compare", None).unwrap();
        ws.get_block_mut(&id).unwrap().set_inputs_inline(true);
        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        assert_eq!(state.inline, None);

        ws.get_block_mut(&id).unwrap().set_inputs_inline(false);
        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        assert_eq!(state.inline, Some(false));
    }

    #[test]
    fn test_coordinates_round_half_up_and_mirror_rtl() {
        let options = WorkspaceOptions {
            rtl: true,
            width: 200.0,
            ..Default::default()
        };
        let registry = crate::standard::standard_registry().unwrap();
        let mut ws = Workspace::new(options, std::sync::Arc::new(registry));
        let id = ws.new_block("text", None).unwrap();
        ws.get_block_mut(&id).unwrap().move_by(49.5, -2.5);
        let save_options = SaveOptions {
            add_coordinates: true,
            ..Default::default()
        };
        let state = save(&ws, ws.get_block(&id).unwrap(), &save_options).unwrap();
        assert_eq!(state.x, Some(151));
        assert_eq!(state.y, Some(-2));
    }

    #[test]
    fn test_insertion_marker_saves_nothing() {
        let mut ws = standard_workspace().unwrap();
        let print = ws.new_block("text_print", None).unwrap();
        let marker = ws.new_block("text", None).unwrap();
        ws.connect(&ConnectionRef::input(&print, "TEXT"), &ConnectionRef::output(&marker))
            .unwrap();
        ws.get_block_mut(&marker).unwrap().set_insertion_marker(true);

        assert!(save(&ws, ws.get_block(&marker).unwrap(), &SaveOptions::default()).is_none());
        let state = save(&ws, ws.get_block(&print).unwrap(), &SaveOptions::default()).unwrap();
        assert!(state.inputs.is_none());
    }

    #[test]
    fn test_save_without_ids_or_children() {
        let mut ws = standard_workspace().unwrap();
        let a = ws.new_block("text_print", None).unwrap();
        let b = ws.new_block("text_print", None).unwrap();
        let text = ws.new_block("text", None).unwrap();
        ws.connect(&ConnectionRef::next(&a), &ConnectionRef::previous(&b)).unwrap();
        ws.connect(&ConnectionRef::input(&a, "TEXT"), &ConnectionRef::output(&text))
            .unwrap();

        let shallow = SaveOptions {
            add_input_blocks: false,
            add_next_blocks: false,
            save_ids: false,
            ..Default::default()
        };
        let state = save(&ws, ws.get_block(&a).unwrap(), &shallow).unwrap();
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({"type": "text_print"}));

        let no_ids = SaveOptions {
            save_ids: false,
            ..Default::default()
        };
        let state = save(&ws, ws.get_block(&a).unwrap(), &no_ids).unwrap();
        let next = state.next.as_ref().unwrap().block.as_ref().unwrap();
        assert!(next.id.is_none());
        assert!(state.inputs.as_ref().unwrap()["TEXT"].block.as_ref().unwrap().id.is_none());
    }

    #[test]
    fn test_shadow_and_real_child_are_both_saved() {
        let mut ws = standard_workspace().unwrap();
        let print = ws.new_block("text_print", None).unwrap();
        let input = ConnectionRef::input(&print, "TEXT");
        ws.set_shadow_state(&input, Some(BlockState::new("text").with_id("sh")))
            .unwrap();
        let real = ws.new_block("text", Some(&"real".into())).unwrap();
        ws.connect(&input, &ConnectionRef::output(&real)).unwrap();

        let state = save(&ws, ws.get_block(&print).unwrap(), &SaveOptions::default()).unwrap();
        let text = &state.inputs.as_ref().unwrap()["TEXT"];
        assert_eq!(text.shadow.as_ref().unwrap().id.as_ref().unwrap(), "sh");
        assert_eq!(text.block.as_ref().unwrap().id.as_ref().unwrap(), "real");
    }

    #[test]
    fn test_shadow_only_input_has_no_block_key() {
        let mut ws = standard_workspace().unwrap();
        let print = ws.new_block("text_print", None).unwrap();
        let input = ConnectionRef::input(&print, "TEXT");
        ws.set_shadow_state(&input, Some(BlockState::new("text"))).unwrap();
        let state = save(&ws, ws.get_block(&print).unwrap(), &SaveOptions::default()).unwrap();
        let text = &state.inputs.as_ref().unwrap()["TEXT"];
        assert!(text.shadow.is_some());
        assert!(text.block.is_none());
    }

    #[test]
    fn test_only_serializable_icons_are_saved() {
        let mut ws = standard_workspace().unwrap();
        let id = ws.new_block("text", None).unwrap();
        {
            let block = ws.get_block_mut(&id).unwrap();
            block.add_icon(Icon::comment("remember"));
            block.add_icon(warning_icon());
        }
        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        let icons = state.icons.as_ref().unwrap();
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[COMMENT]["text"], json!("remember"));
    }

    fn warning_icon() -> Icon {
        Icon::new(crate::icon::IconKind::Warning {
            text: "unused".into(),
        })
    }

    #[test]
    fn test_legacy_xml_extra_state_drops_namespace() {
        let mut ws = standard_workspace().unwrap();
        let id = ws.new_block("text_join", None).unwrap();
        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        assert_eq!(state.extra_state, Some(json!("<mutation items=\"2\"></mutation>")));
    }

    #[test]
    fn test_modern_extra_state_is_omitted_in_default_shape() {
        let mut ws = standard_workspace().unwrap();
        let id = ws.new_block("controls_if", None).unwrap();
        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        assert!(state.extra_state.is_none());
    }

    #[test]
    fn test_repeated_save_is_stable() {
        let mut ws = standard_workspace().unwrap();
        let state = BlockState::new("controls_if")
            .with_extra_state(json!({"elseIfCount": 1, "hasElse": true}))
            .with_input("IF0", ConnectionState::block(BlockState::new("logic_boolean")));
        let id = append(&state, &mut ws, false).unwrap();
        let block = ws.get_block(&id).unwrap();
        assert_eq!(
            save(&ws, block, &SaveOptions::default()),
            save(&ws, block, &SaveOptions::default())
        );
    }

    #[test]
    fn test_load_attributes_unions_legacy_enabled() {
        let mut ws = standard_workspace().unwrap();
        let mut state = BlockState::new("text");
        state.enabled = Some(false);
        state.disabled_reasons = Some(vec!["ORPHANED".into()]);
        let id = append(&state, &mut ws, false).unwrap();
        let reasons: Vec<_> = ws.get_block(&id).unwrap().disabled_reasons().collect();
        assert_eq!(reasons, vec![MANUALLY_DISABLED, "ORPHANED"]);
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        let mut ws = standard_workspace().unwrap();
        let state = BlockState::new("math_number")
            .with_field("NUM", 12)
            .with_field("NOT_A_FIELD", "x");
        let id = append(&state, &mut ws, false).unwrap();
        assert_eq!(ws.get_block(&id).unwrap().field("NUM").unwrap().value(), &json!(12));
    }

    #[test]
    fn test_rejected_field_value_keeps_default() {
        let mut ws = standard_workspace().unwrap();
        let state = BlockState::new("logic_boolean").with_field("BOOL", "MAYBE");
        let id = append(&state, &mut ws, false).unwrap();
        assert_eq!(ws.get_block(&id).unwrap().field("BOOL").unwrap().value(), &json!("TRUE"));
    }

    #[test]
    fn test_variable_field_accepts_bare_id() {
        let mut ws = standard_workspace().unwrap();
        ws.create_variable("count", "", Some("v1".into())).unwrap();
        let state = BlockState::new("variables_get").with_field("VAR", "v1");
        let id = append(&state, &mut ws, false).unwrap();
        assert_eq!(ws.get_block(&id).unwrap().field("VAR").unwrap().value(), &json!("v1"));
        assert_eq!(ws.variables().len(), 1);
    }

    #[test]
    fn test_extra_state_of_wrong_shape_for_xml_hook() {
        let mut ws = standard_workspace().unwrap();
        let state = BlockState::new("text_join").with_extra_state(json!({"items": 3}));
        assert!(matches!(
            append(&state, &mut ws, false),
            Err(EngineError::InvalidExtraState { .. })
        ));
    }

    struct NullState;

    impl crate::definition::ExtraStateHook for NullState {
        fn save_extra_state(&self, _block: &Block, _full: bool) -> Option<Value> {
            Some(Value::Null)
        }

        fn load_extra_state(&self, _block: &mut Block, _state: &Value) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_null_extra_state_is_not_saved() {
        let mut registry = crate::standard::standard_registry().unwrap();
        registry
            .define_json(r#"[{"type": "blank", "mutator": "null_mutator"}]"#)
            .unwrap();
        registry.register_mutator("null_mutator", MutationHook::ExtraState(std::sync::Arc::new(NullState)));
        let mut ws = Workspace::new(WorkspaceOptions::default(), std::sync::Arc::new(registry));
        let id = ws.new_block("blank", Some(&"b".into())).unwrap();

        let state = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
        assert!(state.extra_state.is_none());
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({"type": "blank", "id": "b"}));
    }
}
