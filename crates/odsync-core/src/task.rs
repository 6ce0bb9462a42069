//! Work carried by the pipeline queue
//!
//! Graph and search tasks share one worker pool; each is enqueued with the
//! retry policy of its side.

use async_trait::async_trait;
use odsync_graph::{GraphRegistry, GraphTask};
use odsync_model::EntityRef;
use odsync_queue::{QueueTask, TaskError, TaskExecutor, TaskLabel};
use odsync_search::{DocumentSynchronizer, SearchTask};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One unit of deferred work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum SyncTask {
    /// Triple store update
    Graph(GraphTask),
    /// Search index update
    Search(SearchTask),
}

impl SyncTask {
    /// Target entity
    #[must_use]
    pub fn entity(&self) -> EntityRef {
        match self {
            SyncTask::Graph(task) => task.entity,
            SyncTask::Search(task) => task.entity,
        }
    }

    /// Whether this is graph work
    #[inline]
    #[must_use]
    pub fn is_graph(&self) -> bool {
        matches!(self, SyncTask::Graph(_))
    }
}

impl From<GraphTask> for SyncTask {
    fn from(task: GraphTask) -> Self {
        SyncTask::Graph(task)
    }
}

impl From<SearchTask> for SyncTask {
    fn from(task: SearchTask) -> Self {
        SyncTask::Search(task)
    }
}

impl QueueTask for SyncTask {
    fn label(&self) -> TaskLabel {
        match self {
            SyncTask::Graph(task) => task.label(),
            SyncTask::Search(task) => task.label(),
        }
    }
}

/// Dispatches each task to the registry or the synchronizer
#[derive(Debug, Clone)]
pub struct SyncExecutor {
    graph: Arc<GraphRegistry>,
    search: Arc<DocumentSynchronizer>,
}

impl SyncExecutor {
    /// Create executor
    #[must_use]
    pub fn new(graph: Arc<GraphRegistry>, search: Arc<DocumentSynchronizer>) -> Self {
        Self { graph, search }
    }
}

#[async_trait]
impl TaskExecutor<SyncTask> for SyncExecutor {
    async fn execute(&self, task: &SyncTask) -> Result<(), TaskError> {
        match task {
            SyncTask::Graph(task) => self.graph.execute(task).await,
            SyncTask::Search(task) => self.search.execute(task).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_graph::GraphOp;
    use odsync_model::EntityKind;

    #[test]
    fn label_and_wire_form() {
        let task = SyncTask::from(GraphTask::new(GraphOp::Delete, EntityKind::Resource, 42));
        assert_eq!(
            task.label().to_string(),
            "graph:delete(resources.Resource#42)"
        );
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["target"], "graph");
        assert_eq!(json["op"], "delete");
        let back: SyncTask = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }
}
