//! Consistency-check checkpoints
//!
//! A checkpoint records the phase and last processed id of an interrupted
//! check together with the partial report, so the next run resumes after
//! that id instead of rescanning the whole kind.

use crate::consistency::ConsistencyReport;
use crate::error::SearchError;
use chrono::{DateTime, Utc};
use odsync_model::{EntityId, EntityKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Which side a check is walking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPhase {
    /// Store ids, compared against the index
    Store,
    /// Index ids, compared against the store
    Index,
}

/// Progress of one interrupted check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Kind being checked
    pub entity_kind: EntityKind,
    /// Current phase
    pub phase: CheckPhase,
    /// Last id fully processed in `phase`
    pub last_id: Option<EntityId>,
    /// Findings so far
    pub report: ConsistencyReport,
    /// When the checkpoint was written
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint at the start of a check
    #[must_use]
    pub fn start(entity_kind: EntityKind) -> Self {
        Self {
            entity_kind,
            phase: CheckPhase::Store,
            last_id: None,
            report: ConsistencyReport::new(entity_kind),
            updated_at: Utc::now(),
        }
    }
}

/// Persistence for checkpoints, one slot per entity kind
pub trait CheckpointStore: Send + Sync + std::fmt::Debug {
    /// Saved checkpoint of `kind`
    ///
    /// # Errors
    /// `SearchError::Checkpoint` when the slot cannot be read.
    fn load(&self, kind: EntityKind) -> Result<Option<Checkpoint>, SearchError>;

    /// Overwrite the slot of `checkpoint.entity_kind`
    ///
    /// # Errors
    /// `SearchError::Checkpoint` when the slot cannot be written.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), SearchError>;

    /// Drop the slot of `kind`
    ///
    /// # Errors
    /// `SearchError::Checkpoint` when the slot cannot be removed.
    fn clear(&self, kind: EntityKind) -> Result<(), SearchError>;
}

/// Checkpoints kept for the life of the process
#[derive(Debug, Default)]
pub struct MemoryCheckpoints {
    slots: Mutex<HashMap<EntityKind, Checkpoint>>,
}

impl MemoryCheckpoints {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpoints {
    fn load(&self, kind: EntityKind) -> Result<Option<Checkpoint>, SearchError> {
        Ok(self.slots.lock().get(&kind).cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), SearchError> {
        self.slots
            .lock()
            .insert(checkpoint.entity_kind, checkpoint.clone());
        Ok(())
    }

    fn clear(&self, kind: EntityKind) -> Result<(), SearchError> {
        self.slots.lock().remove(&kind);
        Ok(())
    }
}

/// One JSON file per kind under a directory
///
/// Writes go to a temporary file renamed over the slot, so a crash never
/// leaves a truncated checkpoint behind.
#[derive(Debug, Clone)]
pub struct FileCheckpoints {
    dir: PathBuf,
}

impl FileCheckpoints {
    /// Store rooted at `dir`, created on first save
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the slots
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.segment()))
    }
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> SearchError {
    SearchError::Checkpoint(format!("{}: {err}", path.display()))
}

impl CheckpointStore for FileCheckpoints {
    fn load(&self, kind: EntityKind) -> Result<Option<Checkpoint>, SearchError> {
        let path = self.slot(kind);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| io_error(&path, err))
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), SearchError> {
        fs::create_dir_all(&self.dir).map_err(|err| io_error(&self.dir, err))?;
        let path = self.slot(checkpoint.entity_kind);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(checkpoint).map_err(|err| io_error(&path, err))?;
        fs::write(&tmp, raw).map_err(|err| io_error(&tmp, err))?;
        fs::rename(&tmp, &path).map_err(|err| io_error(&path, err))
    }

    fn clear(&self, kind: EntityKind) -> Result<(), SearchError> {
        let path = self.slot(kind);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&path, err)),
        }
    }
}
