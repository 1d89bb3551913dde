//! The built-in block set.
//!
//! Definitions live in `standard_blocks.json`, embedded at compile time. The
//! three mutating types get their hooks here:
//!
//! | type                | hook         | state                            |
//! |---------------------|--------------|----------------------------------|
//! | `controls_if`       | extra state  | `{"elseIfCount": n, "hasElse": b}` |
//! | `lists_create_with` | extra state  | `{"itemCount": n}`               |
//! | `text_join`         | legacy XML   | `<mutation items="n"></mutation>` |

use std::sync::Arc;

use serde_json::{json, Value};

use kumiki_types::InputType;

use crate::block::{Block, Input};
use crate::definition::{BlockRegistry, ExtraStateHook, MutationHook, XmlMutationHook};
use crate::error::EngineError;
use crate::serialization::blocks::XML_NAMESPACE_ATTRIBUTE;
use crate::workspace::{Workspace, WorkspaceOptions};
use crate::Result;

const STANDARD_BLOCKS: &str = include_str!("standard_blocks.json");

/// Most rows a mutator will build from persisted state.
pub const MAX_MUTATOR_ROWS: usize = 1024;

/// Registry holding the built-in definitions and hooks.
pub fn standard_registry() -> Result<BlockRegistry> {
    let mut registry = BlockRegistry::new();
    let count = registry.define_json(STANDARD_BLOCKS)?;
    registry.register_mutator("controls_if_mutator", MutationHook::ExtraState(Arc::new(IfElseMutator)));
    registry.register_mutator(
        "lists_create_with_mutator",
        MutationHook::ExtraState(Arc::new(ListCreateMutator)),
    );
    registry.register_mutator("text_join_mutator", MutationHook::Xml(Arc::new(TextJoinMutator)));
    tracing::debug!(count, "registered standard block definitions");
    Ok(registry)
}

/// Headless workspace over the built-in block set.
pub fn standard_workspace() -> Result<Workspace> {
    Ok(Workspace::new(WorkspaceOptions::default(), Arc::new(standard_registry()?)))
}

fn invalid(block: &Block, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidExtraState {
        block_type: block.block_type().to_string(),
        reason: reason.into(),
    }
}

/// Non-negative integer member of an extra-state object; absent means 0.
fn count_of(block: &Block, state: &Value, key: &str) -> Result<usize> {
    let count = match state.get(key) {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| invalid(block, format!("'{key}' must be a non-negative integer")))?,
    };
    bounded(block, key, count)
}

fn bounded(block: &Block, key: &str, count: u64) -> Result<usize> {
    match usize::try_from(count) {
        Ok(n) if n <= MAX_MUTATOR_ROWS => Ok(n),
        _ => Err(invalid(block, format!("'{key}' of {count} exceeds {MAX_MUTATOR_ROWS}"))),
    }
}

/// Number of `ADD{n}` rows.
fn item_count(block: &Block) -> usize {
    block.inputs().iter().filter(|i| i.name().starts_with("ADD")).count()
}

/// Rebuild the `ADD0..` rows, with an `EMPTY` placeholder row when there are
/// none. Runs before any child is attached.
fn set_item_count(block: &mut Block, count: usize) {
    let stale: Vec<String> = block
        .inputs()
        .iter()
        .map(|i| i.name().to_string())
        .filter(|name| name.starts_with("ADD") || name == "EMPTY")
        .collect();
    for name in stale {
        block.remove_input(&name);
    }
    if count == 0 {
        block.append_input(Input::new("EMPTY", InputType::Dummy, None));
    }
    for i in 0..count {
        block.append_input(Input::new(format!("ADD{i}"), InputType::Value, None));
    }
}

// ============================================================================
// controls_if
// ============================================================================

struct IfElseMutator;

impl ExtraStateHook for IfElseMutator {
    fn save_extra_state(&self, block: &Block, _do_full_serialization: bool) -> Option<Value> {
        let else_ifs = block
            .inputs()
            .iter()
            .filter(|i| i.name().starts_with("IF"))
            .count()
            .saturating_sub(1);
        let has_else = block.input("ELSE").is_some();
        if else_ifs == 0 && !has_else {
            return None;
        }
        let mut state = serde_json::Map::new();
        if else_ifs > 0 {
            state.insert("elseIfCount".into(), json!(else_ifs));
        }
        if has_else {
            state.insert("hasElse".into(), json!(true));
        }
        Some(Value::Object(state))
    }

    fn load_extra_state(&self, block: &mut Block, state: &Value) -> Result<()> {
        if !state.is_object() {
            return Err(invalid(block, "expected an object"));
        }
        let else_ifs = count_of(block, state, "elseIfCount")?;
        let has_else = state.get("hasElse").and_then(Value::as_bool).unwrap_or(false);

        let stale: Vec<String> = block
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .filter(|name| name != "IF0" && name != "DO0")
            .collect();
        for name in stale {
            block.remove_input(&name);
        }
        for i in 1..=else_ifs {
            block.append_input(Input::new(format!("IF{i}"), InputType::Value, Some(vec!["Boolean".into()])));
            block.append_input(Input::new(format!("DO{i}"), InputType::Statement, None));
        }
        if has_else {
            block.append_input(Input::new("ELSE", InputType::Statement, None));
        }
        Ok(())
    }
}

// ============================================================================
// lists_create_with
// ============================================================================

struct ListCreateMutator;

impl ExtraStateHook for ListCreateMutator {
    fn save_extra_state(&self, block: &Block, _do_full_serialization: bool) -> Option<Value> {
        Some(json!({ "itemCount": item_count(block) }))
    }

    fn load_extra_state(&self, block: &mut Block, state: &Value) -> Result<()> {
        if !state.is_object() {
            return Err(invalid(block, "expected an object"));
        }
        let count = count_of(block, state, "itemCount")?;
        set_item_count(block, count);
        Ok(())
    }
}

// ============================================================================
// text_join (legacy XML)
// ============================================================================

struct TextJoinMutator;

impl XmlMutationHook for TextJoinMutator {
    fn mutation_to_dom(&self, block: &Block) -> Option<String> {
        Some(format!("<mutation{XML_NAMESPACE_ATTRIBUTE} items=\"{}\"></mutation>", item_count(block)))
    }

    fn dom_to_mutation(&self, block: &mut Block, xml: &str) -> Result<()> {
        let re = regex::Regex::new(r#"\bitems\s*=\s*(?:"(\d+)"|'(\d+)')"#).map_err(|e| invalid(block, e.to_string()))?;
        let digits = re
            .captures(xml)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .ok_or_else(|| invalid(block, format!("no items attribute in {xml}")))?;
        let count = digits
            .as_str()
            .parse::<u64>()
            .map_err(|_| invalid(block, format!("'items' of {} is out of range", digits.as_str())))?;
        let count = bounded(block, "items", count)?;
        set_item_count(block, count);
        Ok(())
    }
}
