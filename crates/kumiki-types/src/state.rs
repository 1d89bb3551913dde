//! The State Model: plain, JSON-compatible descriptions of block trees.
//!
//! A [`BlockState`] carries no identity and no behavior. It is produced by the
//! save engine, consumed by the load engine, and persisted by callers in
//! whatever text format they like (normally JSON). Every optional key is
//! omitted on output when absent; an absent key always means "default".
//!
//! ```text
//! BlockState
//!   ├── fields   { name → opaque }
//!   ├── icons    { type → opaque }
//!   ├── inputs   { name → ConnectionState }
//!   └── next     ConnectionState
//!
//! ConnectionState
//!   ├── shadow   BlockState   (stored default, may hide behind `block`)
//!   └── block    BlockState   (real child)
//! ```

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{BlockId, VariableId};

/// Serialized state of one block and (recursively) its children.
///
/// `Clone` and `Drop` walk the `next` chain in a loop, so a statement stack
/// of any length can be copied and freed without deep recursion.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    /// Schema identifier used by the block factory. Empty means missing.
    #[serde(rename = "type", default)]
    pub block_type: String,
    /// Block id. Omitted for anonymized copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BlockId>,
    /// Workspace x coordinate (direction-normalized, integer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    /// Workspace y coordinate (integer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    /// Legacy single-flag form of `disabled_reasons`. Read on load, never
    /// written by save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reasons: Option<Vec<String>>,
    /// Inline-inputs flag, only present when it differs from the type default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<bool>,
    /// Opaque user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Schema-specific mutation payload. Never inspected by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icons: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<IndexMap<String, ConnectionState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<ConnectionState>>,
}

impl BlockState {
    /// A bare state of the given type.
    pub fn new(block_type: impl Into<String>) -> Self {
        let mut state = Self::default();
        state.block_type = block_type.into();
        state
    }

    pub fn with_id(mut self, id: impl Into<BlockId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_icon(mut self, icon_type: impl Into<String>, state: Value) -> Self {
        self.icons
            .get_or_insert_with(IndexMap::new)
            .insert(icon_type.into(), state);
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, connection: ConnectionState) -> Self {
        self.inputs
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), connection);
        self
    }

    pub fn with_next(mut self, connection: ConnectionState) -> Self {
        self.next = Some(Box::new(connection));
        self
    }

    pub fn with_extra_state(mut self, extra_state: Value) -> Self {
        self.extra_state = Some(extra_state);
        self
    }

    /// Has a usable `type`?
    pub fn has_type(&self) -> bool {
        !self.block_type.is_empty()
    }

    /// Number of real (non-shadow) blocks in this tree, including self.
    pub fn real_block_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(state) = pending.pop() {
            count += 1;
            pending.extend(state.connections().filter_map(|c| c.block.as_deref()));
        }
        count
    }

    /// This block followed by every real block below it on its `next` chain.
    pub fn stack(&self) -> impl Iterator<Item = &BlockState> {
        std::iter::successors(Some(self), |state| state.next.as_ref().and_then(|c| c.block.as_deref()))
    }

    /// A copy of this block alone, with no `next` connection.
    fn clone_without_next(&self) -> Self {
        Self {
            block_type: self.block_type.clone(),
            id: self.id.clone(),
            x: self.x,
            y: self.y,
            collapsed: self.collapsed,
            deletable: self.deletable,
            movable: self.movable,
            editable: self.editable,
            enabled: self.enabled,
            disabled_reasons: self.disabled_reasons.clone(),
            inline: self.inline,
            data: self.data.clone(),
            extra_state: self.extra_state.clone(),
            icons: self.icons.clone(),
            fields: self.fields.clone(),
            inputs: self.inputs.clone(),
            next: None,
        }
    }

    /// Input connection states followed by the next connection state.
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionState> {
        self.inputs
            .iter()
            .flat_map(|inputs| inputs.values())
            .chain(self.next.as_deref())
    }
}

impl Clone for BlockState {
    fn clone(&self) -> Self {
        // Each link of the stack, plus the shadow its `next` connection holds
        // (outer `None` when there is no `next` at all).
        let links: Vec<(BlockState, Option<Option<Box<BlockState>>>)> = self
            .stack()
            .map(|state| (state.clone_without_next(), state.next.as_ref().map(|c| c.shadow.clone())))
            .collect();

        let mut tail: Option<BlockState> = None;
        for (mut state, next) in links.into_iter().rev() {
            if let Some(shadow) = next {
                state.next = Some(Box::new(ConnectionState {
                    shadow,
                    block: tail.take().map(Box::new),
                }));
            }
            tail = Some(state);
        }
        tail.unwrap_or_default()
    }
}

impl Drop for BlockState {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut conn) = next {
            next = conn.block.as_mut().and_then(|block| block.next.take());
        }
    }
}

/// Serialized state of one connection: stored default and/or real child.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Box<BlockState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Box<BlockState>>,
}

impl ConnectionState {
    /// A connection holding a real child only.
    pub fn block(state: BlockState) -> Self {
        Self {
            shadow: None,
            block: Some(Box::new(state)),
        }
    }

    /// A connection holding a shadow default only.
    pub fn shadow(state: BlockState) -> Self {
        Self {
            shadow: Some(Box::new(state)),
            block: None,
        }
    }

    /// A real child hiding a shadow default.
    pub fn both(shadow: BlockState, block: BlockState) -> Self {
        Self {
            shadow: Some(Box::new(shadow)),
            block: Some(Box::new(block)),
        }
    }

    /// Neither a shadow nor a child.
    pub fn is_empty(&self) -> bool {
        self.shadow.is_none() && self.block.is_none()
    }
}

/// Output of the block serializer: every top-level block of a workspace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocksState {
    /// Reserved; always 0.
    #[serde(default)]
    pub language_version: u32,
    pub blocks: Vec<BlockState>,
}

/// Serialized state of one workspace variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableState {
    pub name: String,
    pub id: VariableId,
    /// Variable type; the empty string (untyped) is omitted.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub var_type: String,
}

/// Whole-workspace state, keyed by serializer name in priority order.
pub type WorkspaceState = IndexMap<String, Value>;

/// Parse State Model JSON text without serde_json's nesting limit.
///
/// Each statement on a stack nests two levels deeper (`next` then `block`),
/// so ordinary programs pass the default limit of 128 quickly. The stack
/// grows on demand while parsing.
pub fn from_json_str<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    let mut json = serde_json::Deserializer::from_str(text);
    json.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_keys_are_omitted() {
        let state = BlockState::new("math_number").with_id("n1");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, json!({"type": "math_number", "id": "n1"}));
    }

    #[test]
    fn test_camel_case_keys() {
        let mut state = BlockState::new("controls_if");
        state.disabled_reasons = Some(vec!["MANUALLY_DISABLED".into()]);
        state.extra_state = Some(json!({"elseIfCount": 1}));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["disabledReasons"], json!(["MANUALLY_DISABLED"]));
        assert_eq!(json["extraState"], json!({"elseIfCount": 1}));
    }

    #[test]
    fn test_missing_type_parses_as_empty() {
        let state: BlockState = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert!(!state.has_type());
    }

    #[test]
    fn test_null_extra_state_is_absent() {
        let state: BlockState =
            serde_json::from_value(json!({"type": "t", "extraState": null})).unwrap();
        assert!(state.extra_state.is_none());
    }

    #[test]
    fn test_nested_connections_parse() {
        let state: BlockState = serde_json::from_value(json!({
            "type": "controls_if",
            "inputs": {
                "IF0": {
                    "shadow": {"type": "logic_boolean", "fields": {"BOOL": "TRUE"}},
                    "block": {"type": "logic_compare"}
                }
            },
            "next": {"block": {"type": "text_print"}}
        }))
        .unwrap();

        let if0 = &state.inputs.as_ref().unwrap()["IF0"];
        assert_eq!(if0.shadow.as_ref().unwrap().block_type, "logic_boolean");
        assert_eq!(if0.block.as_ref().unwrap().block_type, "logic_compare");
        assert_eq!(state.real_block_count(), 3);
    }

    #[test]
    fn test_field_order_is_preserved() {
        let state = BlockState::new("t")
            .with_field("Z", "z")
            .with_field("A", "a")
            .with_field("M", "m");
        let text = serde_json::to_string(&state).unwrap();
        let z = text.find("\"Z\"").unwrap();
        let a = text.find("\"A\"").unwrap();
        let m = text.find("\"M\"").unwrap();
        assert!(z < a && a < m);
    }

    #[test]
    fn test_untyped_variable_omits_type() {
        let var = VariableState {
            name: "count".into(),
            id: VariableId::from("v1"),
            var_type: String::new(),
        };
        assert_eq!(serde_json::to_value(&var).unwrap(), json!({"name": "count", "id": "v1"}));
    }

    #[test]
    fn test_blocks_state_language_version() {
        let blocks = BlocksState {
            language_version: 0,
            blocks: vec![BlockState::new("text_print")],
        };
        let json = serde_json::to_value(&blocks).unwrap();
        assert_eq!(json["languageVersion"], json!(0));
        assert_eq!(json["blocks"][0]["type"], json!("text_print"));
    }

    fn print_stack(len: usize) -> BlockState {
        let mut state = BlockState::new("text_print").with_id(format!("p{}", len - 1));
        for i in (0..len - 1).rev() {
            state = BlockState::new("text_print")
                .with_id(format!("p{i}"))
                .with_next(ConnectionState::block(state));
        }
        state
    }

    #[test]
    fn test_long_stack_survives_text_round_trip() {
        let state = print_stack(250);
        let text = serde_json::to_string(&state).unwrap();
        assert!(serde_json::from_str::<BlockState>(&text).is_err());

        let parsed: BlockState = from_json_str(&text).unwrap();
        assert_eq!(parsed.stack().count(), 250);
        assert_eq!(parsed.stack().last().unwrap().id.as_ref().unwrap(), "p249");
    }

    #[test]
    fn test_trailing_text_is_rejected() {
        assert!(from_json_str::<BlockState>(r#"{"type": "text"} {"#).is_err());
    }

    #[test]
    fn test_very_long_stack_clones_and_drops() {
        let state = print_stack(100_000);
        let copy = state.clone();
        drop(state);
        assert_eq!(copy.stack().count(), 100_000);
        assert_eq!(copy.real_block_count(), 100_000);
    }

    #[test]
    fn test_clone_keeps_shadow_and_empty_next() {
        let tail = BlockState::new("text_print").with_next(ConnectionState::default());
        let state = BlockState::new("text_print").with_next(ConnectionState::both(BlockState::new("text"), tail));
        let copy = state.clone();
        assert_eq!(copy, state);
        assert_eq!(
            serde_json::to_value(&copy).unwrap(),
            json!({
                "type": "text_print",
                "next": {
                    "shadow": {"type": "text"},
                    "block": {"type": "text_print", "next": {}}
                }
            })
        );
    }
}
