//! The `variables` section of a workspace state.

use serde_json::Value;

use kumiki_types::VariableState;

use crate::error::EngineError;
use crate::serialization::registry::{priorities, Serializer};
use crate::workspace::Workspace;
use crate::Result;

/// Saves and loads the workspace's variable map.
#[derive(Clone, Copy, Debug, Default)]
pub struct VariableSerializer;

impl VariableSerializer {
    pub const NAME: &'static str = "variables";
}

impl Serializer for VariableSerializer {
    fn priority(&self) -> i32 {
        priorities::VARIABLES
    }

    fn save(&self, workspace: &Workspace) -> Result<Option<Value>> {
        let states: Vec<VariableState> = workspace.variables().iter().map(|v| v.to_state()).collect();
        if states.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_value(states)?))
    }

    fn load(&self, state: &Value, workspace: &mut Workspace) -> Result<()> {
        let states: Vec<VariableState> =
            serde_json::from_value(state.clone()).map_err(|source| EngineError::InvalidState {
                serializer: Self::NAME.to_string(),
                source,
            })?;
        for variable in states {
            workspace.create_variable(&variable.name, &variable.var_type, Some(variable.id))?;
        }
        Ok(())
    }

    fn clear(&self, workspace: &mut Workspace) -> Result<()> {
        workspace.clear_variables()
    }
}
