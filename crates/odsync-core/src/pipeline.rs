//! Assembled pipeline and its entrypoints
//!
//! A [`Pipeline`] owns the event bus, one task queue shared by graph and
//! search work, the graph registry, the document synchronizer and the
//! consistency checker. The enqueue entrypoints return as soon as the task
//! is queued; callers that need the outcome wait on the returned
//! [`TaskHandle`].

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::routing::TaskRouter;
use crate::task::{SyncExecutor, SyncTask};
use crate::transaction::Transaction;
use odsync_events::{ChangeEvent, DispatchReport, EventBus, Subscription};
use odsync_graph::{GraphOp, GraphRegistry, GraphTask, UriScheme};
use odsync_model::{EntityId, EntityKind, EntityRef, EntityStore, WatchedFields};
use odsync_queue::{FailureRecord, QueueStats, TaskHandle, TaskQueue};
use odsync_rdf::{HttpTripleStore, TripleStore};
use odsync_search::{
    CheckRun, CheckpointStore, ConsistencyChecker, DocumentSynchronizer, FileCheckpoints,
    HttpSearchIndex, MemoryCheckpoints, SearchIndex, SearchTask,
};
use std::sync::Arc;

/// Consistency checker configured from `config`
///
/// Checkpoints go to `consistency.checkpoint_dir` when set, else memory.
#[must_use]
pub fn consistency_checker(
    config: &SyncConfig,
    store: Arc<dyn EntityStore>,
    index: Arc<dyn SearchIndex>,
) -> ConsistencyChecker {
    let checkpoints: Arc<dyn CheckpointStore> = match &config.consistency.checkpoint_dir {
        Some(dir) => Arc::new(FileCheckpoints::new(dir.clone())),
        None => Arc::new(MemoryCheckpoints::new()),
    };
    ConsistencyChecker::new(store, index)
        .with_batch_size(config.consistency.batch_size)
        .with_checkpoints(checkpoints)
}

/// Builder for [`Pipeline`]
#[derive(Debug)]
pub struct PipelineBuilder {
    config: SyncConfig,
    store: Arc<dyn EntityStore>,
    triples: Option<Arc<dyn TripleStore>>,
    index: Option<Arc<dyn SearchIndex>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    watched: WatchedFields,
}

impl PipelineBuilder {
    /// Use this triple store instead of the configured HTTP endpoint
    #[must_use]
    pub fn with_triple_store(mut self, triples: Arc<dyn TripleStore>) -> Self {
        self.triples = Some(triples);
        self
    }

    /// Use this index instead of the configured HTTP endpoint
    #[must_use]
    pub fn with_search_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Use this checkpoint store instead of the configured one
    #[must_use]
    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    /// With watched-fields table
    #[must_use]
    pub fn with_watched_fields(mut self, watched: WatchedFields) -> Self {
        self.watched = watched;
        self
    }

    /// Validate configuration, connect backends, start the workers
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Invalid configuration, or an HTTP client that cannot be built.
    pub fn build(self) -> Result<Pipeline, SyncError> {
        let config = self.config;
        config.validate()?;

        let scheme = UriScheme::new(&config.rdf.base_uri)?;
        let triples: Arc<dyn TripleStore> = match self.triples {
            Some(triples) => triples,
            None => Arc::new(HttpTripleStore::new(
                config.triple_store.clone(),
                config.rdf.namespaces(),
            )?),
        };
        let index: Arc<dyn SearchIndex> = match self.index {
            Some(index) => index,
            None => Arc::new(HttpSearchIndex::new(config.search.index.clone())?),
        };

        for kind in self.watched.cascades_on_all_fields() {
            tracing::warn!(
                entity_kind = %kind,
                "kind cascades to its dependents on every field change"
            );
        }

        let graph = Arc::new(
            GraphRegistry::new(scheme, Arc::clone(&self.store), triples)
                .with_watched_fields(self.watched)
                .with_cascade_chunk_size(config.rdf.cascade_chunk_size)
                .with_catalog_title(config.rdf.catalog_title.clone()),
        );
        let search = Arc::new(
            DocumentSynchronizer::new(Arc::clone(&self.store), Arc::clone(&index))
                .with_bulk_threshold(config.search.bulk_threshold)
                .with_bulk_chunk_size(config.search.bulk_chunk_size),
        );
        let mut checker = consistency_checker(&config, self.store, index);
        if let Some(checkpoints) = self.checkpoints {
            checker = checker.with_checkpoints(checkpoints);
        }

        let executor = Arc::new(SyncExecutor::new(Arc::clone(&graph), Arc::clone(&search)));
        let queue = TaskQueue::start(config.queue.queue_config(), executor)?;

        let bus = Arc::new(EventBus::new());
        bus.subscribe(
            Subscription::all(),
            Arc::new(TaskRouter::new(
                Arc::clone(&graph),
                queue.clone(),
                config.queue.graph_policy(),
                config.queue.search_policy(),
            )),
        );

        tracing::info!(
            base_uri = %config.rdf.base_uri,
            workers = config.queue.workers,
            "pipeline started"
        );
        Ok(Pipeline {
            config,
            bus,
            queue,
            graph,
            search,
            checker,
        })
    }
}

/// Running synchronization pipeline
#[derive(Debug)]
pub struct Pipeline {
    config: SyncConfig,
    bus: Arc<EventBus>,
    queue: TaskQueue<SyncTask>,
    graph: Arc<GraphRegistry>,
    search: Arc<DocumentSynchronizer>,
    checker: ConsistencyChecker,
}

impl Pipeline {
    /// Start building a pipeline over `store`
    #[must_use]
    pub fn builder(config: SyncConfig, store: Arc<dyn EntityStore>) -> PipelineBuilder {
        PipelineBuilder {
            config,
            store,
            triples: None,
            index: None,
            checkpoints: None,
            watched: WatchedFields::default(),
        }
    }

    /// Effective configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Event bus the task router listens on
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Task queue
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &TaskQueue<SyncTask> {
        &self.queue
    }

    /// Graph registry
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &Arc<GraphRegistry> {
        &self.graph
    }

    /// Document synchronizer
    #[inline]
    #[must_use]
    pub fn search(&self) -> &Arc<DocumentSynchronizer> {
        &self.search
    }

    /// Consistency checker
    #[inline]
    #[must_use]
    pub fn checker(&self) -> &ConsistencyChecker {
        &self.checker
    }

    /// Publish a committed change outside any transaction
    pub fn publish(&self, event: &ChangeEvent) -> DispatchReport {
        self.bus.publish_robust(event)
    }

    /// Open an on-commit transaction on the pipeline's bus
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(&self.bus)
    }

    /// Enqueue graph work with the graph retry policy
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn enqueue_graph(&self, task: GraphTask) -> Result<TaskHandle, SyncError> {
        Ok(self.queue.enqueue(task.into(), self.config.queue.graph_policy())?)
    }

    /// Enqueue search work with the search retry policy
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn enqueue_search(&self, task: SearchTask) -> Result<TaskHandle, SyncError> {
        Ok(self.queue.enqueue(task.into(), self.config.queue.search_policy())?)
    }

    fn graph_op(
        &self,
        op: GraphOp,
        kind: EntityKind,
        id: impl Into<EntityId>,
    ) -> Result<TaskHandle, SyncError> {
        self.enqueue_graph(GraphTask::new(op, kind, id))
    }

    /// Replace the entity's triples
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn update_graph(&self, kind: EntityKind, id: impl Into<EntityId>) -> Result<TaskHandle, SyncError> {
        self.graph_op(GraphOp::Update, kind, id)
    }

    /// Insert the entity's triples
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn create_graph(&self, kind: EntityKind, id: impl Into<EntityId>) -> Result<TaskHandle, SyncError> {
        self.graph_op(GraphOp::Create, kind, id)
    }

    /// Remove the entity's subject; works after the row is gone
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn delete_graph(&self, kind: EntityKind, id: impl Into<EntityId>) -> Result<TaskHandle, SyncError> {
        self.graph_op(GraphOp::Delete, kind, id)
    }

    /// Replace the entity's triples and re-derive every dependent
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn update_related_graph(
        &self,
        kind: EntityKind,
        id: impl Into<EntityId>,
    ) -> Result<TaskHandle, SyncError> {
        self.graph_op(GraphOp::UpdateWithRelated, kind, id)
    }

    /// Remove the entity's child subjects, then the entity
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn delete_sub_graphs(
        &self,
        kind: EntityKind,
        id: impl Into<EntityId>,
    ) -> Result<TaskHandle, SyncError> {
        self.graph_op(GraphOp::DeleteSubGraphs, kind, id)
    }

    /// Rebuild the entity's document and the documents embedding it
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn update_document(
        &self,
        kind: EntityKind,
        id: impl Into<EntityId>,
    ) -> Result<TaskHandle, SyncError> {
        self.enqueue_search(SearchTask::update(EntityRef::new(kind, id)))
    }

    /// Remove the entity's document and rebuild the documents embedding it
    ///
    /// # Errors
    /// `SyncError::Queue` once shutdown has begun.
    pub fn remove_document(
        &self,
        kind: EntityKind,
        id: impl Into<EntityId>,
    ) -> Result<TaskHandle, SyncError> {
        self.enqueue_search(SearchTask::remove(EntityRef::new(kind, id)))
    }

    /// Compare store and index for `kind`; resumes an interrupted check
    ///
    /// # Errors
    /// Store, index or checkpoint failure.
    pub async fn check_consistency(&self, kind: EntityKind) -> Result<CheckRun, SyncError> {
        Ok(self.checker.check(kind).await?)
    }

    /// Queue counters
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Permanently failed tasks
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.queue.failures()
    }

    /// Wait until every queued task is terminal
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Stop intake, drain the queue, stop the workers
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        tracing::info!(stats = ?self.queue.stats(), "pipeline stopped");
    }
}
