//! Block type definitions and the registry the block factory reads from.
//!
//! Definitions are plain serde data in the block-definition JSON shape editors
//! already exchange:
//!
//! ```json
//! {
//!   "type": "text_print",
//!   "inputs": [{"type": "input_value", "name": "TEXT"}],
//!   "previousStatement": null,
//!   "nextStatement": null
//! }
//! ```
//!
//! A connection key that is present (even as `null`) gives the block that
//! connection; `null` means "no type check". Mutation hooks cannot be expressed
//! as data, so a definition names its hook (`"mutator"`) and the code side
//! registers the hook under that name.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use kumiki_types::InputType;

use crate::block::Block;
use crate::error::EngineError;
use crate::field::FieldDefinition;
use crate::Result;

/// One type name or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckSpec {
    One(String),
    Many(Vec<String>),
}

impl CheckSpec {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            CheckSpec::One(s) => vec![s],
            CheckSpec::Many(v) => v,
        }
    }
}

/// Present-but-null keys deserialize to `Some(None)`.
fn present<'de, D>(d: D) -> std::result::Result<Option<Option<CheckSpec>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<CheckSpec>::deserialize(d).map(Some)
}

fn input_kind<'de, D>(d: D) -> std::result::Result<InputType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    let name = raw.strip_prefix("input_").unwrap_or(&raw);
    InputType::from_str(name)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown input type: {raw}")))
}

fn input_kind_name<S>(kind: &InputType, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&format!("input_{}", kind.as_str()))
}

/// Schema for one input row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputDefinition {
    #[serde(rename = "type", deserialize_with = "input_kind", serialize_with = "input_kind_name")]
    pub kind: InputType,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckSpec>,
    /// Fields shown on the row, before the connection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDefinition>,
}

impl InputDefinition {
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            kind: InputType::Value,
            name: name.into(),
            check: None,
            fields: Vec::new(),
        }
    }

    pub fn statement(name: impl Into<String>) -> Self {
        Self {
            kind: InputType::Statement,
            ..Self::value(name)
        }
    }

    pub fn dummy(name: impl Into<String>) -> Self {
        Self {
            kind: InputType::Dummy,
            ..Self::value(name)
        }
    }

    pub fn with_check(mut self, check: impl Into<String>) -> Self {
        self.check = Some(CheckSpec::One(check.into()));
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }
}

/// Schema for one block type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDefinition {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDefinition>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub output: Option<Option<CheckSpec>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub previous_statement: Option<Option<CheckSpec>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub next_statement: Option<Option<CheckSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_inline: Option<bool>,
    /// Name of the mutation hook registered for this type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutator: Option<String>,
}

impl BlockDefinition {
    /// One-line connection summary, e.g. `output(Boolean) inputs[A, B]`.
    pub fn summary(&self) -> String {
        let describe = |name: &str, spec: &Option<Option<CheckSpec>>| {
            spec.as_ref().map(|check| match check {
                Some(check) => format!("{name}({})", check.clone().into_vec().join("|")),
                None => name.to_string(),
            })
        };
        let mut parts: Vec<String> = [
            describe("output", &self.output),
            describe("previous", &self.previous_statement),
            describe("next", &self.next_statement),
        ]
        .into_iter()
        .flatten()
        .collect();
        let inputs: Vec<&str> = self
            .inputs
            .iter()
            .filter(|i| i.kind != InputType::Dummy)
            .map(|i| i.name.as_str())
            .collect();
        if !inputs.is_empty() {
            parts.push(format!("inputs[{}]", inputs.join(", ")));
        }
        if let Some(mutator) = &self.mutator {
            parts.push(format!("mutator={mutator}"));
        }
        parts.join(" ")
    }
}

// ============================================================================
// Mutation hooks
// ============================================================================

/// Modern extra-state hook: JSON in, JSON out.
pub trait ExtraStateHook: Send + Sync {
    /// Extra state to persist, or `None` if the block is in its default shape.
    fn save_extra_state(&self, block: &Block, do_full_serialization: bool) -> Option<Value>;

    /// Reshape the block from persisted extra state. Runs before any child is
    /// attached.
    fn load_extra_state(&self, block: &mut Block, state: &Value) -> Result<()>;
}

/// Legacy mutation hook speaking `<mutation .../>` XML text.
pub trait XmlMutationHook: Send + Sync {
    fn mutation_to_dom(&self, block: &Block) -> Option<String>;

    fn dom_to_mutation(&self, block: &mut Block, xml: &str) -> Result<()>;
}

/// The hook attached to a block type. Modern hooks take precedence; a type
/// has at most one.
#[derive(Clone)]
pub enum MutationHook {
    ExtraState(Arc<dyn ExtraStateHook>),
    Xml(Arc<dyn XmlMutationHook>),
}

impl std::fmt::Debug for MutationHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationHook::ExtraState(_) => f.write_str("MutationHook::ExtraState"),
            MutationHook::Xml(_) => f.write_str("MutationHook::Xml"),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Block type definitions plus the named mutation hooks they refer to.
#[derive(Clone, Debug, Default)]
pub struct BlockRegistry {
    definitions: IndexMap<String, Arc<BlockDefinition>>,
    mutators: HashMap<String, MutationHook>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a definition.
    pub fn define(&mut self, definition: BlockDefinition) {
        self.definitions
            .insert(definition.block_type.clone(), Arc::new(definition));
    }

    /// Register every definition in a JSON array.
    pub fn define_json(&mut self, json: &str) -> Result<usize> {
        let definitions: Vec<BlockDefinition> =
            serde_json::from_str(json).map_err(EngineError::Definitions)?;
        let count = definitions.len();
        for definition in definitions {
            self.define(definition);
        }
        Ok(count)
    }

    pub fn register_mutator(&mut self, name: impl Into<String>, hook: MutationHook) {
        self.mutators.insert(name.into(), hook);
    }

    pub fn get(&self, block_type: &str) -> Option<&Arc<BlockDefinition>> {
        self.definitions.get(block_type)
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.definitions.contains_key(block_type)
    }

    /// The mutation hook for a block type, if its definition names one that
    /// is registered.
    pub fn hook_for(&self, block_type: &str) -> Option<MutationHook> {
        let name = self.definitions.get(block_type)?.mutator.as_ref()?;
        let hook = self.mutators.get(name);
        if hook.is_none() {
            tracing::warn!(block_type, mutator = %name, "definition names an unregistered mutator");
        }
        hook.cloned()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.definitions.values().map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_connection_key_means_unchecked_connection() {
        let def: BlockDefinition = serde_json::from_value(json!({
            "type": "text_print",
            "previousStatement": null,
            "nextStatement": null
        }))
        .unwrap();
        assert_eq!(def.previous_statement, Some(None));
        assert_eq!(def.next_statement, Some(None));
        assert_eq!(def.output, None);
    }

    #[test]
    fn test_check_accepts_string_or_list() {
        let def: BlockDefinition = serde_json::from_value(json!({
            "type": "t",
            "output": ["Number", "String"],
            "inputs": [{"type": "input_value", "name": "A", "check": "Boolean"}]
        }))
        .unwrap();
        assert_eq!(
            def.output.clone().flatten().unwrap().into_vec(),
            vec!["Number".to_string(), "String".to_string()]
        );
        assert_eq!(def.inputs[0].check, Some(CheckSpec::One("Boolean".into())));
    }

    #[test]
    fn test_input_kind_names() {
        let input: InputDefinition =
            serde_json::from_value(json!({"type": "input_statement", "name": "DO"})).unwrap();
        assert_eq!(input.kind, InputType::Statement);
        let back = serde_json::to_value(&input).unwrap();
        assert_eq!(back["type"], json!("input_statement"));
        assert!(serde_json::from_value::<InputDefinition>(json!({"type": "input_sideways"})).is_err());
    }

    #[test]
    fn test_define_json_reports_bad_input() {
        let mut registry = BlockRegistry::new();
        assert!(matches!(registry.define_json("{"), Err(EngineError::Definitions(_))));
        assert_eq!(registry.define_json(r#"[{"type": "a"}, {"type": "b"}]"#).unwrap(), 2);
        assert!(registry.contains("a"));
    }

    #[test]
    fn test_summary() {
        let def: BlockDefinition = serde_json::from_value(json!({
            "type": "logic_compare",
            "output": "Boolean",
            "inputs": [
                {"type": "input_value", "name": "A"},
                {"type": "input_dummy", "name": ""},
                {"type": "input_value", "name": "B"}
            ]
        }))
        .unwrap();
        assert_eq!(def.summary(), "output(Boolean) inputs[A, B]");
    }
}
