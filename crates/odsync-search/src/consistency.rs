//! Store/index drift detection
//!
//! A check walks one entity kind in two phases:
//! - **store → index**: every store id in `batch_size` pages; the document
//!   the id should have is compared with the indexed one
//! - **index → store**: every indexed id; documents whose row is gone are
//!   reported as extra
//!
//! Findings are reported, never repaired. The interrupt flag is polled
//! before each item; an interrupted run leaves a checkpoint behind and the
//! next run continues after the last processed id.

use crate::checkpoint::{CheckPhase, Checkpoint, CheckpointStore, MemoryCheckpoints};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::mapping::DocumentBuilder;
use chrono::Utc;
use odsync_model::{EntityId, EntityKind, EntityRef, EntityStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ids per page in both phases
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Drift found for one entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Kind checked
    pub entity_kind: EntityKind,
    /// Store ids compared
    #[serde(default)]
    pub checked_in_store: usize,
    /// Indexed ids compared
    #[serde(default)]
    pub checked_in_index: usize,
    /// Visible in the store, absent from the index
    pub missing_in_index: BTreeSet<EntityId>,
    /// Indexed with a body that differs from the current projection
    pub stale_in_index: BTreeSet<EntityId>,
    /// Indexed although hidden or gone from the store
    pub extra_in_index: BTreeSet<EntityId>,
}

impl ConsistencyReport {
    /// Empty report
    #[must_use]
    pub fn new(entity_kind: EntityKind) -> Self {
        Self {
            entity_kind,
            checked_in_store: 0,
            checked_in_index: 0,
            missing_in_index: BTreeSet::new(),
            stale_in_index: BTreeSet::new(),
            extra_in_index: BTreeSet::new(),
        }
    }

    /// Number of drifted ids
    #[must_use]
    pub fn drift_count(&self) -> usize {
        self.missing_in_index.len() + self.stale_in_index.len() + self.extra_in_index.len()
    }

    /// No drift found
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drift_count() == 0
    }
}

/// Result of one call to [`ConsistencyChecker::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckRun {
    /// Both phases finished; the checkpoint was cleared
    Completed(ConsistencyReport),
    /// Stopped on request; partial findings are in the checkpoint too
    Interrupted(ConsistencyReport),
}

impl CheckRun {
    /// Report, complete or partial
    #[must_use]
    pub fn report(&self) -> &ConsistencyReport {
        match self {
            CheckRun::Completed(report) | CheckRun::Interrupted(report) => report,
        }
    }

    /// Whether both phases ran to the end
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, CheckRun::Completed(_))
    }
}

/// Compares the relational store with the search index
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    builder: DocumentBuilder,
    index: Arc<dyn SearchIndex>,
    checkpoints: Arc<dyn CheckpointStore>,
    batch_size: usize,
    interrupt: Arc<AtomicBool>,
}

impl ConsistencyChecker {
    /// Checker with in-memory checkpoints
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self::with_builder(DocumentBuilder::new(store), index)
    }

    /// Checker projecting documents through `builder`
    #[must_use]
    pub fn with_builder(builder: DocumentBuilder, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            builder,
            index,
            checkpoints: Arc::new(MemoryCheckpoints::new()),
            batch_size: DEFAULT_BATCH_SIZE,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// With checkpoint store
    #[must_use]
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// With batch size (at least 1)
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Shared flag; setting it stops the running check before its next item
    #[must_use]
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Request the running check to stop
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    fn interrupted(&self) -> bool {
        self.interrupt.swap(false, Ordering::SeqCst)
    }

    fn pause(&self, mut checkpoint: Checkpoint) -> Result<CheckRun, SearchError> {
        checkpoint.updated_at = Utc::now();
        self.checkpoints.save(&checkpoint)?;
        tracing::info!(
            entity_kind = %checkpoint.entity_kind,
            phase = ?checkpoint.phase,
            last_id = ?checkpoint.last_id.map(|id| id.get()),
            "consistency check interrupted"
        );
        Ok(CheckRun::Interrupted(checkpoint.report))
    }

    /// Check `kind`, resuming from a saved checkpoint if there is one
    ///
    /// # Errors
    /// Store, index or checkpoint failure. Progress up to the last finished
    /// batch stays checkpointed.
    #[tracing::instrument(name = "consistency_check", skip(self), fields(entity_kind = %kind))]
    pub async fn check(&self, kind: EntityKind) -> Result<CheckRun, SearchError> {
        self.builder.mapping(kind)?;
        let mut checkpoint = match self.checkpoints.load(kind)? {
            Some(saved) => {
                tracing::info!(phase = ?saved.phase, last_id = ?saved.last_id.map(|id| id.get()), "resuming consistency check");
                saved
            }
            None => Checkpoint::start(kind),
        };

        if checkpoint.phase == CheckPhase::Store {
            loop {
                let ids = self
                    .builder
                    .store()
                    .scan_ids(kind, checkpoint.last_id, self.batch_size)
                    .await?;
                if ids.is_empty() {
                    break;
                }
                let indexed: HashMap<EntityId, String> = self
                    .index
                    .get_many(kind, &ids)
                    .await?
                    .into_iter()
                    .map(|doc| (doc.id, doc.checksum()))
                    .collect();

                for id in ids {
                    if self.interrupted() {
                        return self.pause(checkpoint);
                    }
                    let expected = self.builder.build(EntityRef::new(kind, id)).await?;
                    let report = &mut checkpoint.report;
                    match (expected, indexed.get(&id)) {
                        (Some(_), None) => {
                            report.missing_in_index.insert(id);
                        }
                        (Some(doc), Some(checksum)) if doc.checksum() != *checksum => {
                            report.stale_in_index.insert(id);
                        }
                        (None, Some(_)) => {
                            report.extra_in_index.insert(id);
                        }
                        _ => {}
                    }
                    report.checked_in_store += 1;
                    checkpoint.last_id = Some(id);
                }
                checkpoint.updated_at = Utc::now();
                self.checkpoints.save(&checkpoint)?;
            }
            checkpoint.phase = CheckPhase::Index;
            checkpoint.last_id = None;
            self.checkpoints.save(&checkpoint)?;
        }

        loop {
            let docs = self
                .index
                .scan(kind, checkpoint.last_id, self.batch_size)
                .await?;
            if docs.is_empty() {
                break;
            }
            for doc in docs {
                if self.interrupted() {
                    return self.pause(checkpoint);
                }
                if self.builder.store().load(doc.entity_ref()).await?.is_none() {
                    checkpoint.report.extra_in_index.insert(doc.id);
                }
                checkpoint.report.checked_in_index += 1;
                checkpoint.last_id = Some(doc.id);
            }
            checkpoint.updated_at = Utc::now();
            self.checkpoints.save(&checkpoint)?;
        }

        self.checkpoints.clear(kind)?;
        let report = checkpoint.report;
        let drift = report.drift_count();
        if drift > 0 {
            metrics::counter!("odsync_consistency_drift_total", "entity_kind" => kind.label())
                .increment(drift as u64);
            tracing::warn!(
                missing = report.missing_in_index.len(),
                stale = report.stale_in_index.len(),
                extra = report.extra_in_index.len(),
                "search index drift detected"
            );
        } else {
            tracing::info!(
                checked_in_store = report.checked_in_store,
                checked_in_index = report.checked_in_index,
                "search index consistent"
            );
        }
        Ok(CheckRun::Completed(report))
    }
}
