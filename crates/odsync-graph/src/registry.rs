//! Graph operation registry
//!
//! Routes a [`GraphTask`] to the [`GraphMapping`] of its entity kind and
//! turns it into SPARQL updates:
//! - creates insert, updates delete-then-insert, deletes remove by subject
//! - an entity that is no longer visible is deleted whatever the operation
//! - cascades reload each dependent and rewrite it, one request per chunk
//! - catalog members trigger a full recompute of the catalog timestamp
//!
//! Every request is built from current store state, never from the task
//! payload, so replays and out-of-order deliveries converge.

use crate::catalog::{CatalogAggregator, CatalogMembers};
use crate::error::GraphError;
use crate::mapping::{default_mappings, GraphMapping, MappingContext};
use crate::op::{GraphOp, GraphTask};
use crate::uri::UriScheme;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use odsync_model::{Entity, EntityKind, EntityRef, EntityStore, RelatedEntities, WatchedFields};
use odsync_queue::{TaskError, TaskExecutor};
use odsync_rdf::{SparqlUpdate, TripleStore, UpdateOp};
use std::collections::HashMap;
use std::sync::Arc;

/// Dependents rewritten per SPARQL request
pub const DEFAULT_CASCADE_CHUNK_SIZE: usize = 50;

/// What one task did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphOutcome {
    /// Subjects written (own plus cascaded)
    pub upserted: usize,
    /// Subjects removed (own plus cascaded)
    pub deleted: usize,
    /// Dependents rewritten or removed
    pub cascaded: usize,
    /// Conditional cascade skipped, no watched field changed
    pub cascade_skipped: bool,
    /// Update requests sent, catalog included
    pub requests: usize,
    /// Catalog timestamp written, when recomputed
    pub catalog_modified: Option<Option<DateTime<Utc>>>,
}

/// Kind-to-mapping table plus the stores it writes through
#[derive(Debug, Clone)]
pub struct GraphRegistry {
    mappings: HashMap<EntityKind, Arc<dyn GraphMapping>>,
    scheme: UriScheme,
    store: Arc<dyn EntityStore>,
    triples: Arc<dyn TripleStore>,
    watched: WatchedFields,
    catalog: CatalogAggregator,
    cascade_chunk_size: usize,
}

impl GraphRegistry {
    /// Registry with the built-in mapping of every kind
    #[must_use]
    pub fn new(scheme: UriScheme, store: Arc<dyn EntityStore>, triples: Arc<dyn TripleStore>) -> Self {
        let catalog = CatalogAggregator::new(&scheme, store.clone(), triples.clone());
        let mut registry = Self {
            mappings: HashMap::new(),
            scheme,
            store,
            triples,
            watched: WatchedFields::default(),
            catalog,
            cascade_chunk_size: DEFAULT_CASCADE_CHUNK_SIZE,
        };
        for mapping in default_mappings() {
            registry.register(mapping);
        }
        registry
    }

    /// Registry without any mapping
    #[must_use]
    pub fn empty(scheme: UriScheme, store: Arc<dyn EntityStore>, triples: Arc<dyn TripleStore>) -> Self {
        let mut registry = Self::new(scheme, store, triples);
        registry.mappings.clear();
        registry
    }

    /// Register or replace the mapping of `mapping.kind()`
    pub fn register(&mut self, mapping: Arc<dyn GraphMapping>) {
        self.mappings.insert(mapping.kind(), mapping);
    }

    /// With mapping (builder form of [`GraphRegistry::register`])
    #[must_use]
    pub fn with_mapping(mut self, mapping: Arc<dyn GraphMapping>) -> Self {
        self.register(mapping);
        self
    }

    /// With watched-fields table
    #[must_use]
    pub fn with_watched_fields(mut self, watched: WatchedFields) -> Self {
        self.watched = watched;
        self
    }

    /// With cascade chunk size (at least 1)
    #[must_use]
    pub fn with_cascade_chunk_size(mut self, size: usize) -> Self {
        self.cascade_chunk_size = size.max(1);
        self
    }

    /// With catalog title
    #[must_use]
    pub fn with_catalog_title(mut self, title: impl Into<String>) -> Self {
        self.catalog = self.catalog.with_title(title);
        self
    }

    /// URI scheme
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> &UriScheme {
        &self.scheme
    }

    /// Catalog aggregator
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &CatalogAggregator {
        &self.catalog
    }

    /// Watched-fields table
    #[inline]
    #[must_use]
    pub fn watched_fields(&self) -> &WatchedFields {
        &self.watched
    }

    /// Registered kinds
    #[must_use]
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.mappings.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Mapping of `kind`
    ///
    /// # Errors
    /// `GraphError::UnmappedKind` when nothing is registered for `kind`.
    pub fn mapping(&self, kind: EntityKind) -> Result<&Arc<dyn GraphMapping>, GraphError> {
        self.mappings.get(&kind).ok_or(GraphError::UnmappedKind(kind))
    }

    /// Run one graph task
    ///
    /// # Errors
    /// - `UnmappedKind` for kinds without a mapping
    /// - `EntityVanished` when a create or update finds no row
    /// - `Mapping` when the row cannot be projected
    /// - store and triple store failures
    #[tracing::instrument(
        name = "process_graph",
        skip_all,
        fields(op = %task.op, entity_kind = %task.entity.kind, entity_id = %task.entity.id)
    )]
    pub async fn process_graph(&self, task: &GraphTask) -> Result<GraphOutcome, GraphError> {
        let mapping = self.mapping(task.entity.kind)?;
        let mut outcome = GraphOutcome::default();

        let own = if task.op.is_delete() {
            self.delete_request(mapping.as_ref(), task)
        } else {
            let entity = self
                .store
                .load(task.entity)
                .await?
                .ok_or(GraphError::EntityVanished(task.entity))?;
            let mut update = SparqlUpdate::new();
            if self
                .write_subject(mapping.as_ref(), &entity, !task.op.is_create(), &mut update)
                .await?
            {
                outcome.upserted += 1;
            } else {
                outcome.deleted += 1;
            }
            update
        };
        if task.op.is_delete() {
            outcome.deleted += 1;
        }
        self.triples.update(&own).await?;
        outcome.requests += 1;
        metrics::counter!("odsync_graph_updates_total", "op" => task.op.as_str()).increment(1);

        if task.op.cascades() {
            if task.op == GraphOp::UpdateWithConditionalRelated
                && !self.watched.triggers(task.entity.kind, &task.changed_fields)
            {
                tracing::debug!(changed = ?task.changed_fields, "no watched field changed, cascade skipped");
                outcome.cascade_skipped = true;
            } else {
                let targets = self.cascade_targets(mapping.as_ref(), task).await?;
                self.cascade(&targets, &mut outcome).await?;
            }
        }

        if mapping.in_catalog() {
            let modified = self
                .catalog
                .update_catalog_modified(CatalogMembers::Aggregate)
                .await?;
            outcome.requests += 1;
            outcome.catalog_modified = Some(modified);
        }

        tracing::info!(
            upserted = outcome.upserted,
            deleted = outcome.deleted,
            cascaded = outcome.cascaded,
            requests = outcome.requests,
            "graph operation applied"
        );
        Ok(outcome)
    }

    fn delete_request(&self, mapping: &dyn GraphMapping, task: &GraphTask) -> SparqlUpdate {
        let subject = mapping.subject_for(&self.scheme, task.entity.id);
        let mut update = SparqlUpdate::new();
        if task.op == GraphOp::DeleteSubGraphs {
            match mapping.sub_graph_link() {
                Some(predicate) => update.push(UpdateOp::DeleteLinked {
                    parent: subject.clone(),
                    predicate,
                }),
                None => tracing::debug!("kind has no sub-graphs, deleting subject only"),
            }
        }
        update.push(UpdateOp::DeleteSubject {
            subject,
            inbound: true,
        });
        update
    }

    /// Append the writes for `entity` to `update`; `true` if it was written,
    /// `false` if it was removed for being unpublished
    async fn write_subject(
        &self,
        mapping: &dyn GraphMapping,
        entity: &Entity,
        replace: bool,
        update: &mut SparqlUpdate,
    ) -> Result<bool, GraphError> {
        let subject = mapping.subject_for(&self.scheme, entity.id());
        let related =
            RelatedEntities::load(self.store.as_ref(), entity, mapping.context_kinds()).await?;
        let ctx = MappingContext::new(&self.scheme, &related);
        if !mapping.is_published(entity, &ctx) {
            update.push(UpdateOp::DeleteSubject {
                subject,
                inbound: true,
            });
            return Ok(false);
        }
        let triples = mapping.to_triples(entity, &ctx)?;
        if replace {
            update.push(UpdateOp::DeleteSubject {
                subject,
                inbound: mapping.owns_inbound_links(),
            });
        }
        update.push(UpdateOp::InsertData(triples));
        Ok(true)
    }

    async fn cascade_targets(&self, mapping: &dyn GraphMapping, task: &GraphTask) -> Result<Vec<EntityRef>, GraphError> {
        // A delete-with-related task names its targets; every other cascade
        // adds the named entities to the dependents found in the store.
        let mut targets = task.related.clone();
        if task.op != GraphOp::DeleteWithRelatedUpdate || task.related.is_empty() {
            for kind in mapping.dependents() {
                targets.extend(
                    self.store
                        .related_ids(task.entity, *kind)
                        .await?
                        .into_iter()
                        .map(|id| EntityRef::new(*kind, id)),
                );
            }
        }
        targets.sort();
        targets.dedup();
        targets.retain(|t| *t != task.entity);
        Ok(targets)
    }

    async fn cascade(&self, targets: &[EntityRef], outcome: &mut GraphOutcome) -> Result<(), GraphError> {
        for chunk in targets.chunks(self.cascade_chunk_size) {
            let mut update = SparqlUpdate::new();
            for target in chunk {
                let mapping = self.mapping(target.kind)?;
                match self.store.load(*target).await? {
                    Some(entity) => {
                        if self.write_subject(mapping.as_ref(), &entity, true, &mut update).await? {
                            outcome.upserted += 1;
                        } else {
                            outcome.deleted += 1;
                        }
                    }
                    None => {
                        update.push(UpdateOp::DeleteSubject {
                            subject: mapping.subject_for(&self.scheme, target.id),
                            inbound: true,
                        });
                        outcome.deleted += 1;
                    }
                }
                outcome.cascaded += 1;
            }
            self.triples.update(&update).await?;
            outcome.requests += 1;
            tracing::debug!(targets = chunk.len(), "cascade chunk applied");
        }
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor<GraphTask> for GraphRegistry {
    async fn execute(&self, task: &GraphTask) -> Result<(), TaskError> {
        self.process_graph(task).await.map(|_| ()).map_err(TaskError::from)
    }
}
