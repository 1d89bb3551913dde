//! Converting live workspaces to and from the State Model.
//!
//! - [`blocks`]: the recursive save and load engines for one block tree.
//! - [`variables`]: the variable section of a workspace state.
//! - [`registry`]: whole-workspace save/load over prioritized serializers.

pub mod blocks;
pub mod registry;
pub mod variables;

use serde_json::Value;

pub use blocks::{append, append_internal, save, AppendOptions, SaveOptions};
pub use registry::{load_workspace, priorities, save_workspace, BlockSerializer, Serializer, SerializerRegistry};
pub use variables::VariableSerializer;

/// Truthiness for loosely typed state values: `null`, `false`, `0` and `""`
/// count as absent.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
