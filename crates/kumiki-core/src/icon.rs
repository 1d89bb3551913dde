//! Block icons and the registry that constructs them by type name.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::Coordinate;

pub const COMMENT: &str = "comment";
pub const WARNING: &str = "warning";
pub const MUTATOR: &str = "mutator";

/// Persisted state of a comment icon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommentState {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default = "CommentState::default_height")]
    pub height: f64,
    #[serde(default = "CommentState::default_width")]
    pub width: f64,
}

impl CommentState {
    fn default_height() -> f64 {
        80.0
    }

    fn default_width() -> f64 {
        160.0
    }
}

impl Default for CommentState {
    fn default() -> Self {
        Self {
            text: String::new(),
            pinned: false,
            height: Self::default_height(),
            width: Self::default_width(),
        }
    }
}

/// What an icon is.
#[derive(Clone, Debug, PartialEq)]
pub enum IconKind {
    Comment {
        state: CommentState,
        bubble_visible: bool,
    },
    /// Transient diagnostics; never persisted.
    Warning { text: String },
    /// Mutator editor affordance; its shape lives in extra state.
    Mutator,
    /// Icon type registered by an embedding application.
    Custom {
        icon_type: String,
        serializable: bool,
        state: Option<Value>,
    },
}

/// An icon attached to a block.
#[derive(Clone, Debug, PartialEq)]
pub struct Icon {
    kind: IconKind,
    anchor: Option<Coordinate>,
}

impl Icon {
    pub fn new(kind: IconKind) -> Self {
        Self { kind, anchor: None }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(IconKind::Comment {
            state: CommentState {
                text: text.into(),
                ..Default::default()
            },
            bubble_visible: false,
        })
    }

    pub fn kind(&self) -> &IconKind {
        &self.kind
    }

    pub fn icon_type(&self) -> &str {
        match &self.kind {
            IconKind::Comment { .. } => COMMENT,
            IconKind::Warning { .. } => WARNING,
            IconKind::Mutator => MUTATOR,
            IconKind::Custom { icon_type, .. } => icon_type,
        }
    }

    /// Does this icon persist state?
    pub fn is_serializable(&self) -> bool {
        match &self.kind {
            IconKind::Comment { .. } => true,
            IconKind::Warning { .. } | IconKind::Mutator => false,
            IconKind::Custom { serializable, .. } => *serializable,
        }
    }

    /// State to persist. Comments without text persist nothing.
    pub fn save_state(&self) -> Option<Value> {
        match &self.kind {
            IconKind::Comment { state, .. } if !state.text.is_empty() => serde_json::to_value(state).ok(),
            IconKind::Custom { serializable: true, state, .. } => state.clone(),
            _ => None,
        }
    }

    /// Load persisted state. Returns `true` if the icon wants its bubble shown
    /// once the block has been positioned.
    pub fn load_state(&mut self, value: &Value) -> bool {
        match &mut self.kind {
            IconKind::Comment { state, .. } => {
                match serde_json::from_value::<CommentState>(value.clone()) {
                    Ok(loaded) => *state = loaded,
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring malformed comment state");
                        return false;
                    }
                }
                state.pinned
            }
            IconKind::Custom { serializable: true, state, .. } => {
                *state = Some(value.clone());
                false
            }
            _ => false,
        }
    }

    pub fn bubble_visible(&self) -> bool {
        matches!(self.kind, IconKind::Comment { bubble_visible: true, .. })
    }

    /// Show or hide a comment's bubble. An open bubble is a pinned comment.
    pub fn set_bubble_visible(&mut self, visible: bool) {
        if let IconKind::Comment { state, bubble_visible } = &mut self.kind {
            *bubble_visible = visible;
            state.pinned = visible;
        }
    }

    /// Where the renderer last placed the icon.
    pub fn anchor(&self) -> Option<Coordinate> {
        self.anchor
    }

    pub fn on_location_change(&mut self, at: Coordinate) {
        self.anchor = Some(at);
    }
}

/// Constructs a fresh icon of one type.
pub type IconConstructor = Arc<dyn Fn() -> IconKind + Send + Sync>;

/// Icon type name → constructor.
#[derive(Clone, Default)]
pub struct IconRegistry {
    constructors: IndexMap<String, IconConstructor>,
}

impl IconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in comment, warning and mutator icons.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(COMMENT, || IconKind::Comment {
            state: CommentState::default(),
            bubble_visible: false,
        });
        registry.register(WARNING, || IconKind::Warning { text: String::new() });
        registry.register(MUTATOR, || IconKind::Mutator);
        registry
    }

    pub fn register<F>(&mut self, icon_type: impl Into<String>, constructor: F)
    where
        F: Fn() -> IconKind + Send + Sync + 'static,
    {
        self.constructors.insert(icon_type.into(), Arc::new(constructor));
    }

    pub fn unregister(&mut self, icon_type: &str) -> bool {
        self.constructors.shift_remove(icon_type).is_some()
    }

    pub fn create(&self, icon_type: &str) -> Option<Icon> {
        self.constructors
            .get(icon_type)
            .map(|constructor| Icon::new(constructor()))
    }

    pub fn contains(&self, icon_type: &str) -> bool {
        self.constructors.contains_key(icon_type)
    }
}

impl std::fmt::Debug for IconRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconRegistry")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_comment_saves_nothing() {
        assert_eq!(Icon::comment("").save_state(), None);
    }

    #[test]
    fn test_comment_state_round_trip_shape() {
        let mut icon = Icon::comment("");
        let wants_bubble = icon.load_state(&json!({"text": "hello", "pinned": true}));
        assert!(wants_bubble);
        assert!(!icon.bubble_visible());
        assert_eq!(
            icon.save_state(),
            Some(json!({"text": "hello", "pinned": true, "height": 80.0, "width": 160.0}))
        );
    }

    #[test]
    fn test_closing_bubble_unpins() {
        let mut icon = Icon::comment("note");
        icon.set_bubble_visible(true);
        assert_eq!(icon.save_state().unwrap()["pinned"], json!(true));
        icon.set_bubble_visible(false);
        assert_eq!(icon.save_state().unwrap()["pinned"], json!(false));
    }

    #[test]
    fn test_warning_and_mutator_are_not_serializable() {
        let registry = IconRegistry::standard();
        assert!(!registry.create(WARNING).unwrap().is_serializable());
        assert!(!registry.create(MUTATOR).unwrap().is_serializable());
        assert!(registry.create(COMMENT).unwrap().is_serializable());
        assert!(registry.create("sparkle").is_none());
    }

    #[test]
    fn test_custom_icon_keeps_opaque_state() {
        let mut registry = IconRegistry::new();
        registry.register("badge", || IconKind::Custom {
            icon_type: "badge".into(),
            serializable: true,
            state: None,
        });
        let mut icon = registry.create("badge").unwrap();
        assert_eq!(icon.icon_type(), "badge");
        icon.load_state(&json!({"level": 3}));
        assert_eq!(icon.save_state(), Some(json!({"level": 3})));
    }
}
