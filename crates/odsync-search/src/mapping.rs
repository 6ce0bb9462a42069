//! Per-kind document mappings
//!
//! Each [`DocumentMapping`] declares the related kinds its document embeds
//! and the kinds whose documents embed it (the fan-out targets when it
//! changes). [`DocumentBuilder`] loads current state and applies them.

use crate::document::SearchDocument;
use crate::error::SearchError;
use odsync_model::{Entity, EntityKind, EntityRef, EntityStore, RelatedEntities};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Field mapping of one index
pub trait DocumentMapping: Send + Sync + fmt::Debug {
    /// Kind handled
    fn kind(&self) -> EntityKind;

    /// Kinds whose visible rows the document embeds
    fn context_kinds(&self) -> &'static [EntityKind] {
        &[]
    }

    /// Kinds whose documents embed this kind
    fn dependents(&self) -> &'static [EntityKind] {
        &[]
    }

    /// Whether the row belongs in the index ("visible now", not "exists")
    fn is_published(&self, entity: &Entity, _related: &RelatedEntities) -> bool {
        entity.is_visible()
    }

    /// Document body
    fn body(&self, entity: &Entity, related: &RelatedEntities) -> Map<String, Value>;
}

/// Every built-in mapping
#[must_use]
pub fn default_document_mappings() -> Vec<Arc<dyn DocumentMapping>> {
    vec![
        Arc::new(DatasetDocument),
        Arc::new(ResourceDocument),
        Arc::new(OrganizationDocument),
        Arc::new(LicenseDocument),
        Arc::new(CategoryDocument),
    ]
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn lifecycle_fields(entity: &Entity, body: &mut Map<String, Value>) {
    let lifecycle = entity.lifecycle();
    body.insert("status".into(), json!(lifecycle.status));
    body.insert("created".into(), json!(lifecycle.created));
    body.insert("modified".into(), json!(lifecycle.modified));
}

/// `datasets` index
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetDocument;

impl DocumentMapping for DatasetDocument {
    fn kind(&self) -> EntityKind {
        EntityKind::Dataset
    }

    fn context_kinds(&self) -> &'static [EntityKind] {
        &[
            EntityKind::Organization,
            EntityKind::License,
            EntityKind::Category,
            EntityKind::Resource,
        ]
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Organization, EntityKind::Resource]
    }

    fn body(&self, entity: &Entity, related: &RelatedEntities) -> Map<String, Value> {
        let Entity::Dataset(ds) = entity else {
            return Map::new();
        };
        let organization = related
            .get(EntityKind::Organization, ds.organization_id)
            .map(|org| json!({"id": org.id(), "title": org.title()}));
        let license = ds
            .license_id
            .and_then(|id| related.get(EntityKind::License, id))
            .and_then(|l| match l {
                Entity::License(l) => Some(json!({"id": l.id, "name": l.name, "title": l.title})),
                _ => None,
            });
        let categories: Vec<Value> = related
            .of_kind(EntityKind::Category)
            .filter_map(|c| match c {
                Entity::Category(c) => Some(json!({"id": c.id, "code": c.code, "title": c.title})),
                _ => None,
            })
            .collect();
        let resources: Vec<Value> = related
            .of_kind(EntityKind::Resource)
            .filter_map(|r| match r {
                Entity::Resource(r) => Some(json!({"id": r.id, "title": r.title, "format": r.format})),
                _ => None,
            })
            .collect();

        let mut body = object(json!({
            "id": ds.id,
            "title": ds.title,
            "slug": ds.slug,
            "notes": ds.notes,
            "tags": ds.tags,
            "organization": organization,
            "license": license,
            "categories": categories,
            "resources_count": resources.len(),
            "resources": resources,
        }));
        lifecycle_fields(entity, &mut body);
        body
    }
}

/// `resources` index; a resource is searchable only while its dataset is
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceDocument;

impl DocumentMapping for ResourceDocument {
    fn kind(&self) -> EntityKind {
        EntityKind::Resource
    }

    fn context_kinds(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset, EntityKind::Organization]
    }

    fn is_published(&self, entity: &Entity, related: &RelatedEntities) -> bool {
        match entity {
            Entity::Resource(r) => {
                entity.is_visible() && related.get(EntityKind::Dataset, r.dataset_id).is_some()
            }
            _ => false,
        }
    }

    fn body(&self, entity: &Entity, related: &RelatedEntities) -> Map<String, Value> {
        let Entity::Resource(res) = entity else {
            return Map::new();
        };
        let dataset = related
            .get(EntityKind::Dataset, res.dataset_id)
            .map(|ds| json!({"id": ds.id(), "title": ds.title()}));
        let mut body = object(json!({
            "id": res.id,
            "title": res.title,
            "description": res.description,
            "format": res.format,
            "link": res.link,
            "dataset": dataset,
        }));
        lifecycle_fields(entity, &mut body);
        body
    }
}

/// `organizations` index, with counts of what it publishes
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationDocument;

impl DocumentMapping for OrganizationDocument {
    fn kind(&self) -> EntityKind {
        EntityKind::Organization
    }

    fn context_kinds(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset, EntityKind::Resource]
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn body(&self, entity: &Entity, related: &RelatedEntities) -> Map<String, Value> {
        let Entity::Organization(org) = entity else {
            return Map::new();
        };
        let datasets: Vec<Value> = related
            .of_kind(EntityKind::Dataset)
            .map(|ds| json!({"id": ds.id(), "title": ds.title()}))
            .collect();
        let published_resources = related
            .of_kind(EntityKind::Resource)
            .filter(|r| match r {
                Entity::Resource(r) => related.get(EntityKind::Dataset, r.dataset_id).is_some(),
                _ => false,
            })
            .count();
        let mut body = object(json!({
            "id": org.id,
            "title": org.title,
            "slug": org.slug,
            "description": org.description,
            "website": org.website,
            "published_datasets_count": datasets.len(),
            "published_resources_count": published_resources,
            "datasets": datasets,
        }));
        lifecycle_fields(entity, &mut body);
        body
    }
}

/// `licenses` index
#[derive(Debug, Clone, Copy, Default)]
pub struct LicenseDocument;

impl DocumentMapping for LicenseDocument {
    fn kind(&self) -> EntityKind {
        EntityKind::License
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn body(&self, entity: &Entity, _related: &RelatedEntities) -> Map<String, Value> {
        let Entity::License(l) = entity else {
            return Map::new();
        };
        let mut body = object(json!({"id": l.id, "name": l.name, "title": l.title, "url": l.url}));
        lifecycle_fields(entity, &mut body);
        body
    }
}

/// `categories` index
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryDocument;

impl DocumentMapping for CategoryDocument {
    fn kind(&self) -> EntityKind {
        EntityKind::Category
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn body(&self, entity: &Entity, _related: &RelatedEntities) -> Map<String, Value> {
        let Entity::Category(c) = entity else {
            return Map::new();
        };
        let mut body = object(json!({"id": c.id, "code": c.code, "title": c.title}));
        lifecycle_fields(entity, &mut body);
        body
    }
}

/// Builds documents from current store state
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    mappings: HashMap<EntityKind, Arc<dyn DocumentMapping>>,
    store: Arc<dyn EntityStore>,
}

impl DocumentBuilder {
    /// Builder with the built-in mapping of every kind
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let mut builder = Self {
            mappings: HashMap::new(),
            store,
        };
        for mapping in default_document_mappings() {
            builder.register(mapping);
        }
        builder
    }

    /// Register or replace the mapping of `mapping.kind()`
    pub fn register(&mut self, mapping: Arc<dyn DocumentMapping>) {
        self.mappings.insert(mapping.kind(), mapping);
    }

    /// Relational store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Mapping of `kind`
    ///
    /// # Errors
    /// `SearchError::UnmappedKind` when nothing is registered for `kind`.
    pub fn mapping(&self, kind: EntityKind) -> Result<&Arc<dyn DocumentMapping>, SearchError> {
        self.mappings.get(&kind).ok_or(SearchError::UnmappedKind(kind))
    }

    /// Document `entity` should have in the index, `None` when it must be
    /// absent (row gone or not visible)
    ///
    /// # Errors
    /// Unmapped kind or store failure.
    pub async fn build(&self, entity: EntityRef) -> Result<Option<SearchDocument>, SearchError> {
        match self.store.load(entity).await? {
            Some(row) => self.build_loaded(&row).await,
            None => {
                self.mapping(entity.kind)?;
                Ok(None)
            }
        }
    }

    /// Same as [`DocumentBuilder::build`] for an already loaded row
    ///
    /// # Errors
    /// Unmapped kind or store failure.
    pub async fn build_loaded(&self, entity: &Entity) -> Result<Option<SearchDocument>, SearchError> {
        let mapping = self.mapping(entity.kind())?;
        let related =
            RelatedEntities::load(self.store.as_ref(), entity, mapping.context_kinds()).await?;
        if !mapping.is_published(entity, &related) {
            return Ok(None);
        }
        Ok(Some(SearchDocument::new(
            entity.kind(),
            entity.id(),
            mapping.body(entity, &related),
        )))
    }

    /// Documents that embed `entity` and must be rebuilt with it
    ///
    /// # Errors
    /// Unmapped kind or store failure.
    pub async fn dependents_of(&self, entity: EntityRef) -> Result<Vec<EntityRef>, SearchError> {
        let mapping = self.mapping(entity.kind)?;
        let mut targets = Vec::new();
        for kind in mapping.dependents() {
            targets.extend(
                self.store
                    .related_ids(entity, *kind)
                    .await?
                    .into_iter()
                    .map(|id| EntityRef::new(*kind, id)),
            );
        }
        targets.sort();
        targets.dedup();
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_model::{Dataset, License, MemoryStore, Organization, Resource, Status};
    use pretty_assertions::assert_eq;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_entities([
            Organization::new(1, "City").into(),
            License::new(3, "cc-by", "CC-BY 4.0").into(),
            Dataset::new(10, 1, "Air").with_license(3).into(),
            Dataset::new(11, 1, "Water").into(),
            Entity::from(Dataset::new(12, 1, "Draft")).with_status(Status::Draft),
            Resource::new(20, 10, "CSV", "https://x.org/a.csv").with_format("csv").into(),
            Resource::new(21, 12, "XLS", "https://x.org/b.xls").into(),
        ]))
    }

    #[tokio::test]
    async fn organization_counts_published_only() {
        let builder = DocumentBuilder::new(store());
        let doc = builder
            .build(EntityRef::new(EntityKind::Organization, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("published_datasets_count"), Some(&json!(2)));
        assert_eq!(doc.get("published_resources_count"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn dataset_embeds_license_and_resources() {
        let builder = DocumentBuilder::new(store());
        let doc = builder
            .build(EntityRef::new(EntityKind::Dataset, 10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("license").and_then(|l| l.get("title")), Some(&json!("CC-BY 4.0")));
        assert_eq!(doc.get("resources_count"), Some(&json!(1)));
        assert_eq!(doc.get("organization").and_then(|o| o.get("title")), Some(&json!("City")));
    }

    #[tokio::test]
    async fn hidden_rows_have_no_document() {
        let builder = DocumentBuilder::new(store());
        assert!(builder
            .build(EntityRef::new(EntityKind::Dataset, 12))
            .await
            .unwrap()
            .is_none());
        assert!(builder
            .build(EntityRef::new(EntityKind::Resource, 21))
            .await
            .unwrap()
            .is_none());
        assert!(builder
            .build(EntityRef::new(EntityKind::Dataset, 99))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn license_fans_out_to_datasets() {
        let builder = DocumentBuilder::new(store());
        assert_eq!(
            builder
                .dependents_of(EntityRef::new(EntityKind::License, 3))
                .await
                .unwrap(),
            vec![EntityRef::new(EntityKind::Dataset, 10)]
        );
        assert_eq!(
            builder
                .dependents_of(EntityRef::new(EntityKind::Resource, 20))
                .await
                .unwrap(),
            vec![
                EntityRef::new(EntityKind::Dataset, 10),
                EntityRef::new(EntityKind::Organization, 1),
            ]
        );
    }
}
