//! Integration tests for block-tree and workspace save/load.
//!
//! # Coverage
//!
//! - **Round trip:** load a state, save it, get the same state back
//! - **Load errors:** every failure surfaces as a typed error carrying the
//!   offending state
//! - **Events:** variable events before the single block event, one group
//! - **Workspace:** serializer ordering, `FinishedLoading`, undo/redo of a load
//! - **Long stacks:** thousands of statements load, save, and undo; text
//!   round trips past serde_json's default nesting limit
//! - **Rendered workspaces:** deferred tasks and their liveness guard

use std::sync::Arc;

use serde_json::{json, Value};

use kumiki_core::events::EventKind;
use kumiki_core::kumiki_types::{from_json_str, BlockState, ConnectionState, WorkspaceState};
use kumiki_core::{
    append, load_workspace, save, save_workspace, standard_registry, standard_workspace, ConnectionRef,
    EngineError, SaveOptions, Workspace, WorkspaceOptions,
};

// ============================================================================
// Shared setup
// ============================================================================

fn state(value: Value) -> BlockState {
    serde_json::from_value(value).unwrap()
}

fn rendered_workspace() -> Workspace {
    let options = WorkspaceOptions {
        rendered: true,
        ..Default::default()
    };
    Workspace::new(options, Arc::new(standard_registry().unwrap()))
}

fn program() -> BlockState {
    state(json!({
        "type": "controls_if",
        "id": "if1",
        "extraState": {"elseIfCount": 1, "hasElse": true},
        "inputs": {
            "IF0": {"block": {
                "type": "logic_compare",
                "id": "cmp",
                "fields": {"OP": "LT"},
                "inputs": {
                    "A": {"block": {
                        "type": "variables_get",
                        "id": "get",
                        "fields": {"VAR": {"id": "v1", "name": "count", "type": ""}}
                    }},
                    "B": {"shadow": {"type": "math_number", "id": "sh1", "fields": {"NUM": 10}}}
                }
            }},
            "DO0": {"block": {
                "type": "text_print",
                "id": "p1",
                "inputs": {
                    "TEXT": {
                        "shadow": {"type": "text", "id": "sh2", "fields": {"TEXT": "default"}},
                        "block": {"type": "text", "id": "t1", "fields": {"TEXT": "small"}}
                    }
                },
                "next": {"block": {
                    "type": "text_print",
                    "id": "p2",
                    "collapsed": true,
                    "icons": {"comment": {"text": "note", "pinned": false, "height": 80.0, "width": 160.0}}
                }}
            }},
            "IF1": {"block": {"type": "logic_boolean", "id": "b1", "fields": {"BOOL": "FALSE"}}},
            "ELSE": {"block": {
                "type": "text_print",
                "id": "p3",
                "disabledReasons": ["MANUALLY_DISABLED"],
                "data": "payload"
            }}
        }
    }))
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_round_trip_reproduces_state() {
    let mut ws = standard_workspace().unwrap();
    let original = program();
    let id = append(&original, &mut ws, true).unwrap();
    let saved = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
    assert_eq!(saved, original);
}

#[test]
fn test_round_trip_into_fresh_workspace() {
    let mut first = standard_workspace().unwrap();
    let id = append(&program(), &mut first, false).unwrap();
    let saved = save(&first, first.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();

    let mut second = standard_workspace().unwrap();
    let id = append(&saved, &mut second, false).unwrap();
    let again = save(&second, second.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
    assert_eq!(again, saved);
    assert_eq!(second.variables().get_by_id(&"v1".into()).unwrap().name, "count");
}

#[test]
fn test_repeated_save_is_identical() {
    let mut ws = standard_workspace().unwrap();
    let id = append(&program(), &mut ws, false).unwrap();
    let block = ws.get_block(&id).unwrap();
    let options = SaveOptions {
        add_coordinates: true,
        ..Default::default()
    };
    assert_eq!(save(&ws, block, &options), save(&ws, block, &options));
}

#[test]
fn test_default_block_saves_minimal_state() {
    let mut ws = standard_workspace().unwrap();
    let id = append(&state(json!({"type": "text_print"})), &mut ws, false).unwrap();
    let saved = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
    assert_eq!(serde_json::to_value(&saved).unwrap(), json!({"type": "text_print", "id": id.as_str()}));
}

#[test]
fn test_real_child_wins_over_shadow_until_removed() {
    let mut ws = standard_workspace().unwrap();
    append(&program(), &mut ws, false).unwrap();
    let text = ConnectionRef::input(&"p1".into(), "TEXT");
    assert_eq!(ws.target_block(&text).unwrap().unwrap(), "t1");

    ws.dispose_block(&"t1".into(), false).unwrap();
    let respawned = ws.target_block(&text).unwrap().unwrap();
    assert_eq!(respawned, "sh2");
    assert!(ws.get_block(&respawned).unwrap().is_shadow());
}

#[test]
fn test_insertion_marker_child_is_left_out() {
    let mut ws = standard_workspace().unwrap();
    let id = append(&program(), &mut ws, false).unwrap();
    ws.get_block_mut(&"p2".into()).unwrap().set_insertion_marker(true);
    let saved = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
    let do0 = saved.inputs.as_ref().unwrap()["DO0"].block.as_ref().unwrap();
    assert!(do0.next.is_none());
}

#[test]
fn test_legacy_mutation_round_trip() {
    let mut ws = standard_workspace().unwrap();
    let original = state(json!({
        "type": "text_join",
        "id": "j",
        "extraState": "<mutation items=\"3\"></mutation>",
        "inputs": {"ADD2": {"block": {"type": "text", "id": "t", "fields": {"TEXT": "x"}}}}
    }));
    let id = append(&original, &mut ws, false).unwrap();
    let saved = save(&ws, ws.get_block(&id).unwrap(), &SaveOptions::default()).unwrap();
    assert_eq!(saved, original);
}

// ============================================================================
// Load errors
// ============================================================================

#[test]
fn test_missing_type() {
    let mut ws = standard_workspace().unwrap();
    let err = append(&state(json!({"id": "x"})), &mut ws, false).unwrap_err();
    assert!(matches!(err, EngineError::MissingBlockType { .. }));
    assert_eq!(err.state().unwrap().id.as_ref().unwrap(), "x");
}

#[test]
fn test_unknown_input_name() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({
        "type": "text_print",
        "inputs": {"not_an_input": {"block": {"type": "text"}}}
    }));
    match append(&bad, &mut ws, false).unwrap_err() {
        EngineError::MissingConnection { connection, block, state } => {
            assert_eq!(connection, "not_an_input");
            assert_eq!(block.block_type, "text_print");
            assert_eq!(*state, bad);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_next_on_block_without_next_connection() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({"type": "logic_compare", "next": {"block": {"type": "text_print"}}}));
    assert!(matches!(
        append(&bad, &mut ws, false),
        Err(EngineError::MissingConnection { connection, .. }) if connection == "next"
    ));
}

#[test]
fn test_value_block_in_statement_slot() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({"type": "text_print", "next": {"block": {"type": "logic_compare"}}}));
    match append(&bad, &mut ws, false).unwrap_err() {
        EngineError::MissingConnection { connection, block, state } => {
            assert_eq!(connection, "previous");
            assert_eq!(block.block_type, "logic_compare");
            assert_eq!(state.block_type, "logic_compare");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_statement_block_in_value_slot() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({"type": "logic_compare", "inputs": {"A": {"block": {"type": "text_print"}}}}));
    assert!(matches!(
        append(&bad, &mut ws, false),
        Err(EngineError::MissingConnection { connection, .. }) if connection == "output"
    ));
}

#[test]
fn test_failed_type_check() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({
        "type": "logic_operation",
        "inputs": {"A": {"block": {"type": "math_number", "id": "n1"}}}
    }));
    match append(&bad, &mut ws, false).unwrap_err() {
        EngineError::BadConnectionCheck { reason, connection, block, .. } => {
            assert_eq!(connection, "output connection");
            assert_eq!(block.id, "n1");
            assert_eq!(
                reason,
                "Connection checks failed. Output Connection of \"math_number\" block (id=\"n1\") \
                 expected Number, found Boolean"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_real_block_under_shadow_input() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({
        "type": "text_print",
        "inputs": {"TEXT": {"shadow": {
            "type": "text_join",
            "inputs": {"ADD0": {"block": {"type": "text"}}}
        }}}
    }));
    assert!(matches!(
        append(&bad, &mut ws, false),
        Err(EngineError::RealChildOfShadow { .. })
    ));
}

#[test]
fn test_real_block_under_shadow_next() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({
        "type": "controls_repeat_ext",
        "inputs": {"DO": {"shadow": {
            "type": "text_print",
            "next": {"block": {"type": "text_print"}}
        }}}
    }));
    assert!(matches!(
        append(&bad, &mut ws, false),
        Err(EngineError::RealChildOfShadow { .. })
    ));
}

#[test]
fn test_unregistered_icon() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({"type": "text", "icons": {"sparkle": {}}}));
    assert!(matches!(
        append(&bad, &mut ws, false),
        Err(EngineError::UnregisteredIcon { icon_type, .. }) if icon_type == "sparkle"
    ));
}

#[test]
fn test_failed_load_restores_event_state() {
    let mut ws = standard_workspace().unwrap();
    let bad = state(json!({"type": "text_print", "next": {"block": {"type": "logic_compare"}}}));
    assert!(append(&bad, &mut ws, true).is_err());
    assert!(ws.events().is_enabled());
    assert!(ws.events().group().is_none());
    assert!(ws.events().record_undo());
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_variables_fire_before_single_block_create() {
    let mut ws = standard_workspace().unwrap();
    let tree = state(json!({
        "type": "variables_set",
        "id": "set",
        "fields": {"VAR": {"id": "va", "name": "a"}},
        "inputs": {"VALUE": {"block": {
            "type": "variables_get",
            "fields": {"VAR": {"id": "vb", "name": "b"}}
        }}},
        "next": {"block": {"type": "text_print"}}
    }));
    append(&tree, &mut ws, true).unwrap();

    let events = ws.events_mut().take_events();
    let kinds: Vec<_> = events.iter().map(|e| e.kind.name()).collect();
    assert_eq!(kinds, vec!["var_create", "var_create", "block_create"]);

    let group = events[0].group.clone();
    assert!(group.is_some());
    assert!(events.iter().all(|e| e.group == group && e.record_undo));

    match &events[2].kind {
        EventKind::BlockCreate { block_id, ids, .. } => {
            assert_eq!(block_id, "set");
            assert_eq!(ids.len(), 3);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_load_without_undo_leaves_stack_empty() {
    let mut ws = standard_workspace().unwrap();
    append(&program(), &mut ws, false).unwrap();
    assert!(ws.events().undo_stack().is_empty());
    assert!(!ws.events().log().is_empty());
}

// ============================================================================
// Workspace
// ============================================================================

fn workspace_state() -> WorkspaceState {
    serde_json::from_value(json!({
        "variables": [{"name": "count", "id": "v1"}],
        "blocks": {
            "languageVersion": 0,
            "blocks": [
                {
                    "type": "variables_get",
                    "id": "g",
                    "x": 10,
                    "y": 20,
                    "fields": {"VAR": {"id": "v1"}}
                },
                {"type": "text", "id": "t", "x": 10, "y": 80, "fields": {"TEXT": "hi"}}
            ]
        }
    }))
    .unwrap()
}

#[test]
fn test_workspace_round_trip() {
    let mut ws = standard_workspace().unwrap();
    let original = workspace_state();
    load_workspace(&original, &mut ws, false).unwrap();
    let saved = save_workspace(&ws).unwrap();
    assert_eq!(serde_json::to_value(&saved).unwrap(), serde_json::to_value(&original).unwrap());
    let keys: Vec<_> = saved.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["variables", "blocks"]);
}

#[test]
fn test_workspace_load_replaces_contents() {
    let mut ws = standard_workspace().unwrap();
    append(&program(), &mut ws, false).unwrap();
    load_workspace(&workspace_state(), &mut ws, false).unwrap();
    assert_eq!(ws.block_count(), 2);
    assert_eq!(ws.variables().len(), 1);
    assert!(ws.block(&"if1".into()).is_none());
}

#[test]
fn test_finished_loading_closes_the_group() {
    let mut ws = standard_workspace().unwrap();
    load_workspace(&workspace_state(), &mut ws, true).unwrap();
    let events = ws.events().log();
    let last = events.last().unwrap();
    assert!(matches!(last.kind, EventKind::FinishedLoading));
    assert!(events.iter().all(|e| e.group == last.group));
    assert_eq!(events[0].kind.name(), "var_create");
}

#[test]
fn test_undo_and_redo_of_load() {
    let mut ws = standard_workspace().unwrap();
    load_workspace(&workspace_state(), &mut ws, true).unwrap();

    ws.undo(false).unwrap();
    assert_eq!(ws.block_count(), 0);
    assert!(ws.variables().is_empty());

    ws.undo(true).unwrap();
    assert_eq!(ws.block_count(), 2);
    assert_eq!(ws.variables().get_by_id(&"v1".into()).unwrap().name, "count");
    assert_eq!(
        serde_json::to_value(save_workspace(&ws).unwrap()).unwrap(),
        serde_json::to_value(workspace_state()).unwrap()
    );
}

// ============================================================================
// Long stacks
// ============================================================================

/// `len` chained `text_print` blocks with ids `p0`, `p1`, ...
fn print_stack(len: usize) -> BlockState {
    let mut stack = BlockState::new("text_print").with_id(format!("p{}", len - 1));
    for i in (0..len - 1).rev() {
        stack = BlockState::new("text_print")
            .with_id(format!("p{i}"))
            .with_next(ConnectionState::block(stack));
    }
    stack
}

#[test]
fn test_long_stack_appends_saves_and_undoes() {
    let mut ws = standard_workspace().unwrap();
    let top = append(&print_stack(5000), &mut ws, true).unwrap();
    assert_eq!(ws.block_count(), 5000);

    let saved = save(&ws, ws.get_block(&top).unwrap(), &SaveOptions::default()).unwrap();
    let ids: Vec<&str> = saved.stack().map(|s| s.id.as_ref().unwrap().as_str()).collect();
    assert_eq!(ids.len(), 5000);
    assert_eq!(ids[0], "p0");
    assert_eq!(ids[4999], "p4999");

    match &ws.events().log().last().unwrap().kind {
        EventKind::BlockCreate { ids, .. } => assert_eq!(ids.len(), 5000),
        other => panic!("expected BlockCreate, got {}", other.name()),
    }

    ws.undo(false).unwrap();
    assert_eq!(ws.block_count(), 0);
}

#[test]
fn test_long_stack_survives_json_text() {
    let mut ws = standard_workspace().unwrap();
    append(&print_stack(300), &mut ws, false).unwrap();
    let text = serde_json::to_string(&save_workspace(&ws).unwrap()).unwrap();
    assert!(serde_json::from_str::<WorkspaceState>(&text).is_err());

    let parsed: WorkspaceState = from_json_str(&text).unwrap();
    let mut fresh = standard_workspace().unwrap();
    load_workspace(&parsed, &mut fresh, false).unwrap();
    assert_eq!(fresh.block_count(), 300);
    assert_eq!(serde_json::to_string(&save_workspace(&fresh).unwrap()).unwrap(), text);
}

// ============================================================================
// Rendered workspaces
// ============================================================================

#[test]
fn test_pinned_comment_bubble_opens_after_load() {
    let mut ws = rendered_workspace();
    let tree = state(json!({
        "type": "text",
        "id": "t",
        "icons": {"comment": {"text": "look", "pinned": true}}
    }));
    let id = append(&tree, &mut ws, false).unwrap();
    let bubble = |ws: &Workspace| ws.get_block(&id).unwrap().icon("comment").unwrap().bubble_visible();
    assert!(!bubble(&ws));
    assert!(!ws.get_block(&id).unwrap().render_state().connection_tracking);
    assert!(ws.get_block(&id).unwrap().render_state().rendered);

    ws.run_deferred_tasks();
    assert!(bubble(&ws));
    assert!(ws.get_block(&id).unwrap().render_state().connection_tracking);
}

#[test]
fn test_headless_pinned_comment_opens_immediately() {
    let mut ws = standard_workspace().unwrap();
    let tree = state(json!({"type": "text", "icons": {"comment": {"text": "look", "pinned": true}}}));
    let id = append(&tree, &mut ws, false).unwrap();
    assert!(ws.get_block(&id).unwrap().icon("comment").unwrap().bubble_visible());
    assert!(ws.tasks().is_empty());
}

#[test]
fn test_tasks_for_disposed_blocks_do_nothing() {
    let mut ws = rendered_workspace();
    let tree = state(json!({"type": "text", "id": "t", "icons": {"comment": {"text": "look", "pinned": true}}}));
    let id = append(&tree, &mut ws, false).unwrap();
    assert_eq!(ws.tasks().len(), 2);
    ws.dispose_block(&id, false).unwrap();
    assert_eq!(ws.run_deferred_tasks(), 0);
}

#[test]
fn test_rtl_coordinates_are_mirrored_on_load() {
    let options = WorkspaceOptions {
        rtl: true,
        width: 300.0,
        ..Default::default()
    };
    let mut ws = Workspace::new(options, Arc::new(standard_registry().unwrap()));
    let id = append(&state(json!({"type": "text", "x": 100, "y": 5})), &mut ws, false).unwrap();
    assert_eq!(ws.get_block(&id).unwrap().position().x, 200.0);

    let with_coords = SaveOptions {
        add_coordinates: true,
        ..Default::default()
    };
    let saved = save(&ws, ws.get_block(&id).unwrap(), &with_coords).unwrap();
    assert_eq!((saved.x, saved.y), (Some(100), Some(5)));
}

#[test]
fn test_connection_state_helpers_match_wire_shape() {
    let wire = serde_json::to_value(ConnectionState::block(BlockState::new("text"))).unwrap();
    assert_eq!(wire, json!({"block": {"type": "text"}}));
}
