//! Subcommand bodies.
//!
//! Each command returns the text it would print, so `main` only decides
//! where output goes.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use kumiki_core::{append as append_block, load_workspace, save, save_workspace, SaveOptions, Workspace};
use kumiki_types::{from_json_str, BlockId, BlockState, WorkspaceState};

use crate::config::Config;

// ============================================================================
// Helpers
// ============================================================================

fn read_state(path: &Path) -> Result<WorkspaceState> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    from_json_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// A workspace loaded from `path`, without recording undo.
fn open(config: &Config, path: &Path) -> Result<Workspace> {
    let state = read_state(path)?;
    let mut ws = config.workspace()?;
    load_workspace(&state, &mut ws, false).with_context(|| format!("loading {}", path.display()))?;
    ws.run_deferred_tasks();
    Ok(ws)
}

fn to_json<T: Serialize>(config: &Config, value: &T) -> Result<String> {
    let text = if config.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

// ============================================================================
// Commands
// ============================================================================

/// Load `file` and return the state it saves back to.
pub fn roundtrip(config: &Config, file: &Path) -> Result<String> {
    let original = read_state(file)?;
    let ws = open(config, file)?;
    let saved = save_workspace(&ws)?;

    if saved == original {
        tracing::info!("round trip is lossless");
    } else {
        tracing::warn!("saved state differs from input");
    }
    to_json(config, &saved)
}

/// A short report of what `file` contains.
pub fn check(config: &Config, file: &Path) -> Result<String> {
    let ws = open(config, file)?;
    let top = ws.top_blocks(true);
    let mut report = format!(
        "{}: {} block(s) in {} tree(s), {} variable(s)",
        file.display(),
        ws.block_count(),
        top.len(),
        ws.variables().len()
    );
    for id in &top {
        if let Some(block) = ws.block(id) {
            let at = block.position();
            write!(report, "\n  {} at ({}, {}): {} block(s)", block.label(), at.x, at.y, ws.descendants(id).len())?;
        }
    }
    Ok(report)
}

/// One line per registered block type.
pub fn blocks(config: &Config) -> Result<String> {
    let registry = config.registry()?;
    let lines: Vec<String> = registry
        .definitions()
        .map(|definition| format!("{:<24} {}", definition.block_type, definition.summary()))
        .collect();
    Ok(lines.join("\n"))
}

/// Add the block tree in `block` (JSON) to `file`.
///
/// With `out` the result is written there and nothing is returned.
pub fn append(config: &Config, file: &Path, block: &str, out: Option<&Path>) -> Result<Option<String>> {
    let state: BlockState = from_json_str(block).context("parsing --block")?;
    let mut ws = open(config, file)?;
    let id = append_block(&state, &mut ws, false).context("appending block")?;
    ws.run_deferred_tasks();
    tracing::info!(block = %id, "appended block tree");

    let text = to_json(config, &save_workspace(&ws)?)?;
    match out {
        Some(path) => {
            std::fs::write(path, text + "\n").with_context(|| format!("writing {}", path.display()))?;
            Ok(None)
        }
        None => Ok(Some(text)),
    }
}

/// Save the tree rooted at block `id`. `None` for an insertion marker.
pub fn save_block(config: &Config, file: &Path, id: &str, options: &SaveOptions) -> Result<Option<String>> {
    let ws = open(config, file)?;
    let block = ws.get_block(&BlockId::from(id))?;
    match save(&ws, block, options) {
        Some(state) => Ok(Some(to_json(config, &state)?)),
        None => {
            tracing::warn!(block = id, "block is an insertion marker, nothing to save");
            Ok(None)
        }
    }
}
