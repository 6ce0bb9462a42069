//! Search document synchronizer
//!
//! `update_document` rebuilds the entity's document from current state and
//! upserts it, or deletes it when the entity is no longer visible. Both
//! operations then rebuild every document that embeds the entity. Small
//! fan-outs go out as single requests; from `bulk_threshold` targets on,
//! they are sent as `_bulk` requests of `bulk_chunk_size` items.

use crate::document::{BulkOp, SearchOp, SearchTask};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::mapping::{DocumentBuilder, DocumentMapping};
use async_trait::async_trait;
use odsync_model::{EntityRef, EntityStore};
use odsync_queue::{TaskError, TaskExecutor};
use std::sync::Arc;

/// Fan-out size from which bulk requests are used
pub const DEFAULT_BULK_THRESHOLD: usize = 10;

/// Items per bulk request
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 500;

/// What one synchronization did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Documents written
    pub indexed: usize,
    /// Documents deleted
    pub removed: usize,
    /// Dependent documents rebuilt or deleted
    pub fanned_out: usize,
    /// Index requests sent
    pub requests: usize,
    /// Of which bulk requests
    pub bulk_requests: usize,
}

/// Keeps the index aligned with visible store state
#[derive(Debug, Clone)]
pub struct DocumentSynchronizer {
    builder: DocumentBuilder,
    index: Arc<dyn SearchIndex>,
    bulk_threshold: usize,
    bulk_chunk_size: usize,
}

impl DocumentSynchronizer {
    /// Synchronizer with the built-in document mappings
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            builder: DocumentBuilder::new(store),
            index,
            bulk_threshold: DEFAULT_BULK_THRESHOLD,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
        }
    }

    /// With mapping
    #[must_use]
    pub fn with_mapping(mut self, mapping: Arc<dyn DocumentMapping>) -> Self {
        self.builder.register(mapping);
        self
    }

    /// With bulk threshold (at least 1)
    #[must_use]
    pub fn with_bulk_threshold(mut self, threshold: usize) -> Self {
        self.bulk_threshold = threshold.max(1);
        self
    }

    /// With bulk chunk size (at least 1)
    #[must_use]
    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size.max(1);
        self
    }

    /// Document builder
    #[inline]
    #[must_use]
    pub fn builder(&self) -> &DocumentBuilder {
        &self.builder
    }

    /// Target index
    #[inline]
    #[must_use]
    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Rebuild and store the document of `entity`, then its dependents
    ///
    /// # Errors
    /// Unmapped kind, store or index failure.
    pub async fn update_document(&self, entity: EntityRef) -> Result<SyncOutcome, SearchError> {
        self.run(&SearchTask::update(entity)).await
    }

    /// Delete the document of `entity`, then rebuild its dependents
    ///
    /// # Errors
    /// Unmapped kind, store or index failure.
    pub async fn remove_document(&self, entity: EntityRef) -> Result<SyncOutcome, SearchError> {
        self.run(&SearchTask::remove(entity)).await
    }

    /// Rebuild the documents of `targets` without further fan-out
    ///
    /// # Errors
    /// Unmapped kind, store or index failure.
    pub async fn reindex(&self, targets: &[EntityRef]) -> Result<SyncOutcome, SearchError> {
        let mut outcome = SyncOutcome::default();
        self.refresh(targets, &mut outcome).await?;
        Ok(outcome)
    }

    /// Run one search task
    ///
    /// # Errors
    /// Unmapped kind, store or index failure.
    #[tracing::instrument(
        name = "sync_document",
        skip_all,
        fields(op = %task.op, entity_kind = %task.entity.kind, entity_id = %task.entity.id)
    )]
    pub async fn run(&self, task: &SearchTask) -> Result<SyncOutcome, SearchError> {
        let mut outcome = SyncOutcome::default();
        let doc = match task.op {
            SearchOp::UpdateDocument => self.builder.build(task.entity).await?,
            SearchOp::RemoveDocument => {
                self.builder.mapping(task.entity.kind)?;
                None
            }
        };
        match doc {
            Some(doc) => {
                self.index.upsert(&doc).await?;
                outcome.indexed += 1;
            }
            None => {
                self.index.delete(task.entity).await?;
                outcome.removed += 1;
            }
        }
        outcome.requests += 1;

        let mut targets = self.builder.dependents_of(task.entity).await?;
        targets.extend(task.related.iter().copied());
        targets.sort();
        targets.dedup();
        targets.retain(|t| *t != task.entity);
        self.refresh(&targets, &mut outcome).await?;

        tracing::info!(
            indexed = outcome.indexed,
            removed = outcome.removed,
            fanned_out = outcome.fanned_out,
            requests = outcome.requests,
            "search documents synchronized"
        );
        Ok(outcome)
    }

    async fn refresh(&self, targets: &[EntityRef], outcome: &mut SyncOutcome) -> Result<(), SearchError> {
        if targets.is_empty() {
            return Ok(());
        }
        if targets.len() < self.bulk_threshold {
            for target in targets {
                match self.builder.build(*target).await? {
                    Some(doc) => {
                        self.index.upsert(&doc).await?;
                        outcome.indexed += 1;
                    }
                    None => {
                        self.index.delete(*target).await?;
                        outcome.removed += 1;
                    }
                }
                outcome.requests += 1;
                outcome.fanned_out += 1;
            }
            return Ok(());
        }

        for chunk in targets.chunks(self.bulk_chunk_size) {
            let mut ops = Vec::with_capacity(chunk.len());
            for target in chunk {
                match self.builder.build(*target).await? {
                    Some(doc) => {
                        ops.push(BulkOp::Index(doc));
                        outcome.indexed += 1;
                    }
                    None => {
                        ops.push(BulkOp::Delete(*target));
                        outcome.removed += 1;
                    }
                }
            }
            self.index.bulk(&ops).await?;
            outcome.fanned_out += chunk.len();
            outcome.requests += 1;
            outcome.bulk_requests += 1;
            metrics::counter!("odsync_search_bulk_requests_total").increment(1);
            tracing::debug!(items = ops.len(), "bulk fan-out chunk applied");
        }
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor<SearchTask> for DocumentSynchronizer {
    async fn execute(&self, task: &SearchTask) -> Result<(), TaskError> {
        self.run(task).await.map(|_| ()).map_err(TaskError::from)
    }
}
