//! Workspace variables.
//!
//! [`VariableMap`] is the plain store; the [`Workspace`] methods at the bottom
//! of this module wrap it with event firing and with the lookup-or-create
//! policy variable fields use when they load.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use kumiki_types::{VariableId, VariableState};

use crate::error::EngineError;
use crate::events::EventKind;
use crate::field::FieldKind;
use crate::workspace::Workspace;
use crate::Result;

/// Candidate letters for generated names, in order. No `l`.
const NAME_LETTERS: &str = "ijkmnopqrstuvwxyzabcdefgh";

/// One workspace variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableModel {
    pub id: VariableId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: String,
}

impl VariableModel {
    pub fn to_state(&self) -> VariableState {
        VariableState {
            name: self.name.clone(),
            id: self.id.clone(),
            var_type: self.var_type.clone(),
        }
    }
}

/// Variables in creation order.
#[derive(Clone, Debug, Default)]
pub struct VariableMap {
    variables: IndexMap<VariableId, VariableModel>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_id(&self, id: &VariableId) -> Option<&VariableModel> {
        self.variables.get(id)
    }

    /// Look up by name (case-insensitive) within one type.
    pub fn get(&self, name: &str, var_type: &str) -> Option<&VariableModel> {
        self.variables
            .values()
            .find(|v| v.var_type == var_type && v.name.eq_ignore_ascii_case(name))
    }

    /// Create a variable, or return the existing one with the same name and
    /// type. Fails if the name exists under another id, or the id is taken.
    pub fn create(&mut self, name: &str, var_type: &str, id: Option<VariableId>) -> Result<VariableModel> {
        if let Some(existing) = self.get(name, var_type) {
            if let Some(id) = &id {
                if existing.id != *id {
                    return Err(EngineError::VariableConflict(format!(
                        "variable \"{name}\" is already in use and its id is \"{}\" which conflicts \
                         with the passed in id, \"{id}\"",
                        existing.id
                    )));
                }
            }
            return Ok(existing.clone());
        }
        if let Some(id) = &id {
            if self.variables.contains_key(id) {
                return Err(EngineError::VariableConflict(format!(
                    "variable id \"{id}\" is already in use"
                )));
            }
        }
        let variable = VariableModel {
            id: id.unwrap_or_else(VariableId::generate),
            name: name.to_string(),
            var_type: var_type.to_string(),
        };
        self.variables.insert(variable.id.clone(), variable.clone());
        Ok(variable)
    }

    pub fn remove(&mut self, id: &VariableId) -> Option<VariableModel> {
        self.variables.shift_remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableModel> {
        self.variables.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables.values().map(|v| v.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// A name not in `used` (case-insensitive): `i`, `j`, `k`, ... then `i1`, ...
pub fn generate_unique_name(used: &[&str]) -> String {
    let letters: Vec<char> = NAME_LETTERS.chars().collect();
    let used: Vec<String> = used.iter().map(|n| n.to_lowercase()).collect();
    let mut suffix = 0u32;
    loop {
        for letter in &letters {
            let candidate = if suffix == 0 {
                letter.to_string()
            } else {
                format!("{letter}{suffix}")
            };
            if !used.contains(&candidate) {
                return candidate;
            }
        }
        suffix += 1;
    }
}

/// Snapshot of every variable, in creation order.
pub fn all_variables(workspace: &Workspace) -> Vec<VariableModel> {
    workspace.variables().iter().cloned().collect()
}

/// Variables present now that were not in `before` (compared by id).
pub fn added_variables(workspace: &Workspace, before: &[VariableModel]) -> Vec<VariableModel> {
    workspace
        .variables()
        .iter()
        .filter(|v| !before.iter().any(|b| b.id == v.id))
        .cloned()
        .collect()
}

// ============================================================================
// Workspace integration
// ============================================================================

impl Workspace {
    /// Create a variable, firing `VarCreate` if it is new.
    pub fn create_variable(&mut self, name: &str, var_type: &str, id: Option<VariableId>) -> Result<VariableModel> {
        let existed = self.variables.get(name, var_type).is_some();
        let variable = self.variables.create(name, var_type, id)?;
        if !existed {
            self.fire(EventKind::VarCreate {
                var_id: variable.id.clone(),
                var_name: variable.name.clone(),
                var_type: variable.var_type.clone(),
            });
        }
        Ok(variable)
    }

    /// Delete a variable and every block that uses it.
    pub fn delete_variable(&mut self, id: &VariableId) -> Result<()> {
        if self.variables.get_by_id(id).is_none() {
            return Ok(());
        }
        let opened_group = self.events.group().is_none();
        if opened_group {
            self.events.set_group(true);
        }
        let result = self.delete_variable_in_group(id);
        if opened_group {
            self.events.set_group(false);
        }
        result
    }

    fn delete_variable_in_group(&mut self, id: &VariableId) -> Result<()> {
        for user in self.variable_uses(id) {
            if self.block(&user).is_some() {
                self.dispose_block(&user, true)?;
            }
        }
        if let Some(variable) = self.variables.remove(id) {
            self.fire(EventKind::VarDelete {
                var_id: variable.id,
                var_name: variable.name,
                var_type: variable.var_type,
            });
        }
        Ok(())
    }

    /// Delete every variable.
    pub fn clear_variables(&mut self) -> Result<()> {
        let ids: Vec<VariableId> = self.variables.iter().map(|v| v.id.clone()).collect();
        for id in ids {
            self.delete_variable(&id)?;
        }
        Ok(())
    }

    /// Blocks with a variable field pointing at `id`.
    pub fn variable_uses(&self, id: &VariableId) -> Vec<kumiki_types::BlockId> {
        self.all_blocks()
            .filter(|block| {
                block
                    .fields()
                    .any(|f| f.kind().is_variable_reference() && f.value().as_str() == Some(id.as_str()))
            })
            .map(|block| block.id().clone())
            .collect()
    }

    /// Resolve a variable reference: by id first, then by name and type,
    /// creating it when neither matches. A missing name gets a generated one.
    pub fn get_or_create_variable(
        &mut self,
        id: Option<&VariableId>,
        name: Option<&str>,
        var_type: &str,
    ) -> Result<VariableModel> {
        if let Some(found) = id.and_then(|id| self.variables.get_by_id(id)) {
            return Ok(found.clone());
        }
        if let Some(found) = name.and_then(|name| self.variables.get(name, var_type)) {
            return Ok(found.clone());
        }
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => generate_unique_name(&self.variables.names()),
        };
        self.create_variable(&name, var_type, id.cloned())
    }

    /// Point every unassigned variable field of a block at a variable,
    /// creating the field's default variable if needed.
    pub(crate) fn init_variable_fields(&mut self, block: &kumiki_types::BlockId) -> Result<()> {
        let pending: Vec<(String, Option<String>, String)> = self
            .get_block(block)?
            .fields()
            .filter(|f| f.value().is_null())
            .filter_map(|f| match f.kind() {
                FieldKind::Variable { variable, default_type, .. } => {
                    Some((f.name().to_string(), variable.clone(), default_type.clone()))
                }
                _ => None,
            })
            .collect();
        for (field, default_name, default_type) in pending {
            let variable = self.get_or_create_variable(None, default_name.as_deref(), &default_type)?;
            if let Some(field) = self.get_block_mut(block)?.field_mut(&field) {
                field.set_variable_id(variable.id.as_str());
            }
        }
        Ok(())
    }
}
