//! Operator inputs: entity snapshots and change event logs
//!
//! - snapshot: a JSON array of entities, each tagged with its `kind` label
//! - event log: JSON lines, one [`ChangeEvent`] per line; blank lines and
//!   lines starting with `#` are skipped

use crate::error::SyncError;
use odsync_events::ChangeEvent;
use odsync_model::{Entity, MemoryStore};
use std::path::Path;

/// Entities of a snapshot file
///
/// # Errors
/// `SyncError::Input` when the file is unreadable or not a JSON entity list.
pub fn read_snapshot(path: &Path) -> Result<Vec<Entity>, SyncError> {
    let raw = std::fs::read(path).map_err(|e| SyncError::input(path, e))?;
    serde_json::from_slice(&raw).map_err(|e| SyncError::input(path, e))
}

/// In-memory store loaded from a snapshot file
///
/// # Errors
/// Same as [`read_snapshot`].
pub fn load_snapshot(path: &Path) -> Result<MemoryStore, SyncError> {
    let entities = read_snapshot(path)?;
    tracing::info!(path = %path.display(), entities = entities.len(), "snapshot loaded");
    Ok(MemoryStore::with_entities(entities))
}

/// Events of a JSON-lines log, in file order
///
/// # Errors
/// `SyncError::Input` naming the first bad line.
pub fn read_event_log(path: &Path) -> Result<Vec<ChangeEvent>, SyncError> {
    let raw = std::fs::read_to_string(path).map_err(|e| SyncError::input(path, e))?;
    parse_event_log(&raw).map_err(|(line, e)| SyncError::input(path, format!("line {line}: {e}")))
}

fn parse_event_log(raw: &str) -> Result<Vec<ChangeEvent>, (usize, serde_json::Error)> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| serde_json::from_str(line).map_err(|e| (n + 1, e)))
        .collect()
}
