//! Fields: the editable values that live on a block's input rows.
//!
//! Field behavior is selected by [`FieldKind`], a closed set of tagged variants.
//! Whether a field takes part in serialization is a property of its kind
//! ([`FieldKind::is_serializable`]) rather than something each field instance
//! decides.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::variables::VariableMap;

/// What a field is. Carries the kind-specific schema (options, bounds, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Static text. Not serializable.
    #[serde(rename = "field_label")]
    Label,
    /// Static image. Not serializable.
    #[serde(rename = "field_image")]
    Image {
        #[serde(default)]
        src: String,
    },
    /// Free-form text.
    #[serde(rename = "field_input")]
    Text,
    /// Number with optional bounds.
    #[serde(rename = "field_number")]
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// `"TRUE"` / `"FALSE"`.
    #[serde(rename = "field_checkbox")]
    Checkbox,
    /// One of a fixed list of `[display, value]` options.
    #[serde(rename = "field_dropdown")]
    Dropdown { options: Vec<(String, String)> },
    /// Reference to a workspace variable (value is the variable id).
    #[serde(rename = "field_variable")]
    Variable {
        /// Name of the variable created when none is assigned.
        #[serde(default)]
        variable: Option<String>,
        #[serde(default, rename = "variableTypes")]
        variable_types: Vec<String>,
        #[serde(default, rename = "defaultType")]
        default_type: String,
    },
}

impl FieldKind {
    /// Does this kind persist its value?
    pub fn is_serializable(&self) -> bool {
        !matches!(self, FieldKind::Label | FieldKind::Image { .. })
    }

    /// Does this kind hold a reference to a workspace variable?
    pub fn is_variable_reference(&self) -> bool {
        matches!(self, FieldKind::Variable { .. })
    }

    /// Initial value for a freshly constructed field of this kind.
    pub fn initial_value(&self) -> Value {
        match self {
            FieldKind::Label | FieldKind::Image { .. } | FieldKind::Text => Value::String(String::new()),
            FieldKind::Number { min, .. } => number_value(min.unwrap_or(0.0).max(0.0)),
            FieldKind::Checkbox => Value::String("FALSE".into()),
            FieldKind::Dropdown { options } => options
                .first()
                .map(|(_, value)| Value::String(value.clone()))
                .unwrap_or(Value::Null),
            FieldKind::Variable { .. } => Value::Null,
        }
    }

    /// Coerce a candidate value into this kind's domain.
    ///
    /// Returns `None` when the value cannot be represented; callers keep the
    /// old value in that case. Variable references are resolved by the
    /// workspace, not here.
    pub fn coerce(&self, candidate: &Value) -> Option<Value> {
        match self {
            FieldKind::Label | FieldKind::Image { .. } | FieldKind::Text => match candidate {
                Value::String(_) => Some(candidate.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            FieldKind::Number { min, max } => {
                let n = match candidate {
                    Value::Number(n) => n.as_f64()?,
                    Value::String(s) => s.trim().parse::<f64>().ok()?,
                    _ => return None,
                };
                if !n.is_finite() {
                    return None;
                }
                let n = min.map_or(n, |lo| n.max(lo));
                let n = max.map_or(n, |hi| n.min(hi));
                Some(number_value(n))
            }
            FieldKind::Checkbox => match candidate {
                Value::Bool(b) => Some(Value::String(if *b { "TRUE" } else { "FALSE" }.into())),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::String("TRUE".into())),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::String("FALSE".into())),
                _ => None,
            },
            FieldKind::Dropdown { options } => {
                let s = candidate.as_str()?;
                options
                    .iter()
                    .any(|(_, value)| value == s)
                    .then(|| candidate.clone())
            }
            FieldKind::Variable { .. } => None,
        }
    }
}

/// Integral numbers stay integers so saved states read `42`, not `42.0`.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Schema for one field on an input row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Initial value; falls back to the kind's initial value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A live field.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    kind: FieldKind,
    value: Value,
}

impl Field {
    pub fn from_definition(def: &FieldDefinition) -> Self {
        let initial = def.kind.initial_value();
        let value = def
            .value
            .as_ref()
            .and_then(|v| def.kind.coerce(v))
            .unwrap_or(initial);
        Self {
            name: def.name.clone(),
            kind: def.kind.clone(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_serializable(&self) -> bool {
        self.kind.is_serializable()
    }

    /// Set a value, coercing it into the field's domain.
    ///
    /// Returns `false` (and keeps the old value) if the value is rejected.
    pub fn set_value(&mut self, value: &Value) -> bool {
        match self.kind.coerce(value) {
            Some(v) => {
                self.value = v;
                true
            }
            None => false,
        }
    }

    /// Point a variable field at a variable id.
    pub(crate) fn set_variable_id(&mut self, id: &str) {
        self.value = Value::String(id.to_string());
    }

    /// Serializable state of this field.
    ///
    /// Variable fields save a reference (`{"id"}`), or the whole variable
    /// (`{"id", "name", "type"}`) under full serialization so the state can be
    /// loaded into a workspace where the variable does not exist yet.
    pub fn save_state(&self, variables: &VariableMap, do_full_serialization: bool) -> Value {
        if !self.kind.is_variable_reference() {
            return self.value.clone();
        }
        let Some(id) = self.value.as_str() else {
            return Value::Null;
        };
        let mut state = serde_json::Map::new();
        state.insert("id".into(), Value::String(id.to_string()));
        if do_full_serialization {
            if let Some(var) = variables.get_by_id(&id.into()) {
                state.insert("name".into(), Value::String(var.name.clone()));
                state.insert("type".into(), Value::String(var.var_type.clone()));
            }
        }
        Value::Object(state)
    }
}
