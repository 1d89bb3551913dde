//! CLI configuration (`~/.config/kumiki/config.ron`).
//!
//! ```ron
//! (
//!     workspace: (rtl: false, width: 0.0, rendered: false),
//!     definitions: ["blocks/extra.json"],
//!     pretty: true,
//! )
//! ```
//!
//! Every key is optional. Relative definition paths resolve against the
//! directory holding the config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use kumiki_core::{standard_registry, BlockRegistry, Workspace, WorkspaceOptions};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Options for every workspace the CLI builds.
    pub workspace: WorkspaceOptions,
    /// Block definition files (JSON arrays) merged over the standard set.
    pub definitions: Vec<PathBuf>,
    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: WorkspaceOptions::default(),
            definitions: Vec::new(),
            pretty: true,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kumiki").join("config.ron"))
    }

    /// Load the config named on the command line, or the default one.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        let Some(path) = Self::default_path() else {
            tracing::info!("no config directory available, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Config = ron::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        tracing::debug!(path = %path.display(), definitions = config.definitions.len(), "loaded config");
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in &mut self.definitions {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// The standard block set plus every configured definition file.
    pub fn registry(&self) -> Result<BlockRegistry> {
        let mut registry = standard_registry().context("loading standard block definitions")?;
        for path in &self.definitions {
            let json =
                std::fs::read_to_string(path).with_context(|| format!("reading definitions {}", path.display()))?;
            let count = registry
                .define_json(&json)
                .with_context(|| format!("parsing definitions {}", path.display()))?;
            tracing::info!(path = %path.display(), count, "loaded block definitions");
        }
        Ok(registry)
    }

    /// An empty workspace over the configured registry.
    pub fn workspace(&self) -> Result<Workspace> {
        Ok(Workspace::new(self.workspace.clone(), Arc::new(self.registry()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = ron::from_str("()").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.pretty);
    }

    #[test]
    fn test_partial_config() {
        let config: Config = ron::from_str("(workspace: (rtl: true, width: 640.0), pretty: false)").unwrap();
        assert!(config.workspace.rtl);
        assert_eq!(config.workspace.width, 640.0);
        assert!(!config.workspace.rendered);
        assert!(!config.pretty);
    }

    #[test]
    fn test_relative_definitions_resolve_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ron");
        fs::write(&path, r#"(definitions: ["extra.json", "/abs/other.json"])"#).unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.definitions[0], dir.path().join("extra.json"));
        assert_eq!(config.definitions[1], PathBuf::from("/abs/other.json"));
    }

    #[test]
    fn test_extra_definitions_extend_registry() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("extra.json"),
            r#"[{"type": "sensor_read", "output": "Number", "inputs": [{"type": "input_value", "name": "PORT"}]}]"#,
        )
        .unwrap();
        let path = dir.path().join("config.ron");
        fs::write(&path, r#"(definitions: ["extra.json"])"#).unwrap();

        let mut ws = Config::from_path(&path).unwrap().workspace().unwrap();
        assert!(ws.definitions().contains("sensor_read"));
        assert!(ws.definitions().contains("text_print"));
        ws.new_block("sensor_read", None).unwrap();
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.ron"))).is_err());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ron");
        fs::write(&path, "(pretty: maybe)").unwrap();
        assert!(Config::from_path(&path).is_err());
    }
}
