//! Visible rows related to one entity
//!
//! Projections (triples, search documents) embed fields of related rows.
//! [`RelatedEntities::load`] gathers the visible ones through the
//! [`EntityStore`] so hidden rows never leak into a projection.

use crate::entity::Entity;
use crate::kind::{EntityId, EntityKind, EntityRef};
use crate::store::{EntityStore, StoreError};
use std::collections::BTreeMap;

/// Visible related rows, keyed by address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedEntities {
    rows: BTreeMap<EntityRef, Entity>,
}

impl RelatedEntities {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the visible rows of `kinds` linked to `entity`
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn load(
        store: &dyn EntityStore,
        entity: &Entity,
        kinds: &[EntityKind],
    ) -> Result<Self, StoreError> {
        let mut related = Self::new();
        for kind in kinds {
            for id in store.related_ids(entity.entity_ref(), *kind).await? {
                if let Some(row) = store.load(EntityRef::new(*kind, id)).await? {
                    if row.is_visible() {
                        related.insert(row);
                    }
                }
            }
        }
        Ok(related)
    }

    /// Add a row
    pub fn insert(&mut self, entity: Entity) {
        self.rows.insert(entity.entity_ref(), entity);
    }

    /// Row by address
    #[must_use]
    pub fn get(&self, kind: EntityKind, id: EntityId) -> Option<&Entity> {
        self.rows.get(&EntityRef::new(kind, id))
    }

    /// Rows of one kind, ascending id
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.rows.values().filter(move |e| e.kind() == kind)
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row was loaded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<Entity> for RelatedEntities {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut related = Self::new();
        for entity in iter {
            related.insert(entity);
        }
        related
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Dataset, Organization, Status};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn load_skips_hidden_rows() {
        let store = MemoryStore::with_entities([
            Organization::new(1, "City").into(),
            Dataset::new(10, 1, "Air").into(),
            Entity::from(Dataset::new(11, 1, "Draft")).with_status(Status::Draft),
        ]);
        let org = store.get(EntityRef::new(EntityKind::Organization, 1)).unwrap();

        let related = RelatedEntities::load(&store, &org, &[EntityKind::Dataset])
            .await
            .unwrap();
        assert_eq!(related.len(), 1);
        assert!(related.get(EntityKind::Dataset, EntityId(10)).is_some());
        assert!(related.get(EntityKind::Dataset, EntityId(11)).is_none());
    }
}
