//! Search index interface and in-memory implementation

use crate::document::{BulkOp, SearchDocument};
use crate::error::SearchError;
use async_trait::async_trait;
use odsync_model::{EntityId, EntityKind, EntityRef};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Narrow interface to a document index, one index per entity kind
///
/// Every call is one request; document ids are entity ids.
#[async_trait]
pub trait SearchIndex: Send + Sync + std::fmt::Debug {
    /// Create or replace a document
    ///
    /// # Errors
    /// Transport or index failure.
    async fn upsert(&self, doc: &SearchDocument) -> Result<(), SearchError>;

    /// Remove a document; `Ok(false)` if it was not there
    ///
    /// # Errors
    /// Transport or index failure.
    async fn delete(&self, entity: EntityRef) -> Result<bool, SearchError>;

    /// Apply many operations in one request
    ///
    /// # Errors
    /// Transport failure, or `SearchError::BulkItems` when some items failed.
    async fn bulk(&self, ops: &[BulkOp]) -> Result<(), SearchError>;

    /// Documents with the given ids; absent ids are skipped
    ///
    /// # Errors
    /// Transport or index failure.
    async fn get_many(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<SearchDocument>, SearchError>;

    /// Up to `limit` documents with id greater than `after`, ascending
    ///
    /// # Errors
    /// Transport or index failure.
    async fn scan(
        &self,
        kind: EntityKind,
        after: Option<EntityId>,
        limit: usize,
    ) -> Result<Vec<SearchDocument>, SearchError>;
}

/// Index held in process memory
#[derive(Debug, Default)]
pub struct MemoryIndex {
    docs: RwLock<BTreeMap<EntityRef, SearchDocument>>,
    requests: AtomicUsize,
    bulk_requests: AtomicUsize,
}

impl MemoryIndex {
    /// Empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored document
    #[must_use]
    pub fn document(&self, entity: EntityRef) -> Option<SearchDocument> {
        self.docs.read().get(&entity).cloned()
    }

    /// Whether a document exists
    #[must_use]
    pub fn contains(&self, entity: EntityRef) -> bool {
        self.docs.read().contains_key(&entity)
    }

    /// Ids indexed for `kind`
    #[must_use]
    pub fn ids(&self, kind: EntityKind) -> Vec<EntityId> {
        self.docs
            .read()
            .keys()
            .filter(|r| r.kind == kind)
            .map(|r| r.id)
            .collect()
    }

    /// Total documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Write requests served, bulk included
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Bulk requests served
    #[must_use]
    pub fn bulk_request_count(&self) -> usize {
        self.bulk_requests.load(Ordering::Relaxed)
    }

    /// Put a document directly, bypassing request accounting
    pub fn seed(&self, doc: SearchDocument) {
        self.docs.write().insert(doc.entity_ref(), doc);
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert(&self, doc: &SearchDocument) -> Result<(), SearchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.docs.write().insert(doc.entity_ref(), doc.clone());
        Ok(())
    }

    async fn delete(&self, entity: EntityRef) -> Result<bool, SearchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        Ok(self.docs.write().remove(&entity).is_some())
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<(), SearchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bulk_requests.fetch_add(1, Ordering::Relaxed);
        let mut docs = self.docs.write();
        for op in ops {
            match op {
                BulkOp::Index(doc) => {
                    docs.insert(doc.entity_ref(), doc.clone());
                }
                BulkOp::Delete(entity) => {
                    docs.remove(entity);
                }
            }
        }
        Ok(())
    }

    async fn get_many(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<SearchDocument>, SearchError> {
        let docs = self.docs.read();
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(&EntityRef::new(kind, *id)).cloned())
            .collect())
    }

    async fn scan(
        &self,
        kind: EntityKind,
        after: Option<EntityId>,
        limit: usize,
    ) -> Result<Vec<SearchDocument>, SearchError> {
        Ok(self
            .docs
            .read()
            .values()
            .filter(|d| d.kind == kind && after.map_or(true, |a| d.id > a))
            .take(limit)
            .cloned()
            .collect())
    }
}
