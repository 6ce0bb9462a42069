//! Relational store interface
//!
//! The pipeline never talks to the database directly. It asks this narrow
//! interface to load the current row of an entity, to list the rows related
//! to it, to page through ids, and to aggregate the catalog's newest
//! modification time.

use crate::entity::Entity;
use crate::kind::{EntityId, EntityKind, EntityRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Relational store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Database unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Query failed
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Whether a later attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Read access to the authoritative entity state
#[async_trait]
pub trait EntityStore: Send + Sync + std::fmt::Debug {
    /// Current row, `None` once hard-deleted
    async fn load(&self, entity: EntityRef) -> Result<Option<Entity>, StoreError>;

    /// Ids of `kind` rows linked to `entity`, visible or not
    ///
    /// Works in both directions: `(dataset, Organization)` yields the owner,
    /// `(organization, Dataset)` yields every dataset it publishes.
    async fn related_ids(
        &self,
        entity: EntityRef,
        kind: EntityKind,
    ) -> Result<Vec<EntityId>, StoreError>;

    /// Ascending ids of `kind` strictly greater than `after`
    async fn scan_ids(
        &self,
        kind: EntityKind,
        after: Option<EntityId>,
        limit: usize,
    ) -> Result<Vec<EntityId>, StoreError>;

    /// `MAX(modified)` over visible datasets, `None` for an empty catalog
    async fn catalog_modified(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// In-memory store, used by tests and by snapshot-driven CLI runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<EntityRef, Entity>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store holding `entities`
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.upsert(entity);
        }
        store
    }

    /// Insert or replace a row, returning the previous one
    pub fn upsert(&self, entity: Entity) -> Option<Entity> {
        self.rows.write().insert(entity.entity_ref(), entity)
    }

    /// Apply `f` to a row in place, returning `(before, after)`
    pub fn modify<F>(&self, entity: EntityRef, f: F) -> Option<(Entity, Entity)>
    where
        F: FnOnce(&mut Entity),
    {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&entity)?;
        let before = row.clone();
        f(row);
        Some((before, row.clone()))
    }

    /// Soft delete: flag the row as removed
    pub fn soft_delete(&self, entity: EntityRef) -> Option<Entity> {
        self.modify(entity, |row| row.lifecycle_mut().is_removed = true)
            .map(|(_, after)| after)
    }

    /// Hard delete: drop the row
    pub fn hard_delete(&self, entity: EntityRef) -> Option<Entity> {
        self.rows.write().remove(&entity)
    }

    /// Snapshot of a row
    #[must_use]
    pub fn get(&self, entity: EntityRef) -> Option<Entity> {
        self.rows.read().get(&entity).cloned()
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the store holds no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn ids_where<F>(rows: &BTreeMap<EntityRef, Entity>, pred: F) -> Vec<EntityId>
    where
        F: Fn(&Entity) -> bool,
    {
        rows.values().filter(|e| pred(e)).map(Entity::id).collect()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load(&self, entity: EntityRef) -> Result<Option<Entity>, StoreError> {
        Ok(self.get(entity))
    }

    async fn related_ids(
        &self,
        entity: EntityRef,
        kind: EntityKind,
    ) -> Result<Vec<EntityId>, StoreError> {
        let rows = self.rows.read();
        let own = rows.get(&entity);
        let id = entity.id;

        let ids = match (entity.kind, kind) {
            (EntityKind::Dataset, EntityKind::Organization) => match own {
                Some(Entity::Dataset(d)) => vec![d.organization_id],
                _ => Vec::new(),
            },
            (EntityKind::Dataset, EntityKind::License) => match own {
                Some(Entity::Dataset(d)) => d.license_id.into_iter().collect(),
                _ => Vec::new(),
            },
            (EntityKind::Dataset, EntityKind::Category) => match own {
                Some(Entity::Dataset(d)) => d.category_ids.clone(),
                _ => Vec::new(),
            },
            (EntityKind::Dataset, EntityKind::Resource) => Self::ids_where(&rows, |e| {
                matches!(e, Entity::Resource(r) if r.dataset_id == id)
            }),
            (EntityKind::Resource, EntityKind::Dataset) => match own {
                Some(Entity::Resource(r)) => vec![r.dataset_id],
                _ => Vec::new(),
            },
            (EntityKind::Resource, EntityKind::Organization) => match own {
                Some(Entity::Resource(r)) => {
                    match rows.get(&EntityRef::new(EntityKind::Dataset, r.dataset_id)) {
                        Some(Entity::Dataset(d)) => vec![d.organization_id],
                        _ => Vec::new(),
                    }
                }
                _ => Vec::new(),
            },
            (EntityKind::Organization, EntityKind::Dataset) => Self::ids_where(&rows, |e| {
                matches!(e, Entity::Dataset(d) if d.organization_id == id)
            }),
            (EntityKind::Organization, EntityKind::Resource) => {
                let datasets = Self::ids_where(&rows, |e| {
                    matches!(e, Entity::Dataset(d) if d.organization_id == id)
                });
                Self::ids_where(&rows, |e| {
                    matches!(e, Entity::Resource(r) if datasets.contains(&r.dataset_id))
                })
            }
            (EntityKind::License, EntityKind::Dataset) => Self::ids_where(&rows, |e| {
                matches!(e, Entity::Dataset(d) if d.license_id == Some(id))
            }),
            (EntityKind::Category, EntityKind::Dataset) => Self::ids_where(&rows, |e| {
                matches!(e, Entity::Dataset(d) if d.category_ids.contains(&id))
            }),
            _ => Vec::new(),
        };

        Ok(ids)
    }

    async fn scan_ids(
        &self,
        kind: EntityKind,
        after: Option<EntityId>,
        limit: usize,
    ) -> Result<Vec<EntityId>, StoreError> {
        let rows = self.rows.read();
        let ids = rows
            .keys()
            .filter(|r| r.kind == kind && after.map_or(true, |a| r.id > a))
            .take(limit)
            .map(|r| r.id)
            .collect();
        Ok(ids)
    }

    async fn catalog_modified(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let rows = self.rows.read();
        Ok(rows
            .values()
            .filter(|e| e.kind() == EntityKind::Dataset && e.is_visible())
            .map(Entity::modified)
            .max())
    }
}
