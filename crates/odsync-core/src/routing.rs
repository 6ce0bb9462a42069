//! Change event to task routing
//!
//! | Event | Graph | Search |
//! |---|---|---|
//! | created, published, restored | create (with related update when the kind has dependents) | update document |
//! | updated | update with conditional related; related update for kinds watched on every field | update document |
//! | removed, deleted | delete sub-graphs for parents, delete with related update for kinds with dependents, plain delete otherwise | remove document |
//! | related added/removed/changed | update of the entity and of each counterpart | update document of the entity and of each counterpart |
//!
//! Related entities named on the event travel with the tasks, so dependents
//! are still reachable after a hard delete.

use crate::task::SyncTask;
use odsync_events::{ChangeEvent, Handler, HandlerError, Operation};
use odsync_graph::{GraphMapping, GraphOp, GraphRegistry, GraphTask};
use odsync_queue::{RetryPolicy, TaskQueue};
use odsync_search::SearchTask;
use std::sync::Arc;

/// Graph tasks raised by `event`
///
/// Kinds the registry has no mapping for raise nothing.
#[must_use]
pub fn graph_tasks(event: &ChangeEvent, registry: &GraphRegistry) -> Vec<GraphTask> {
    let entity = event.entity();
    let Ok(mapping) = registry.mapping(entity.kind) else {
        tracing::debug!(entity = %entity, "no graph mapping, event not routed to the graph");
        return Vec::new();
    };
    let has_dependents = !mapping.dependents().is_empty();
    let task = |op| GraphTask::new(op, entity.kind, entity.id).with_related(event.related().iter().copied());

    match event.operation() {
        Operation::Created | Operation::Published | Operation::Restored => {
            let op = if has_dependents {
                GraphOp::CreateWithRelatedUpdate
            } else {
                GraphOp::Create
            };
            vec![task(op)]
        }
        Operation::Updated => {
            let op = if registry
                .watched_fields()
                .cascades_on_all_fields()
                .contains(&entity.kind)
            {
                GraphOp::UpdateWithRelated
            } else if has_dependents {
                GraphOp::UpdateWithConditionalRelated
            } else {
                GraphOp::Update
            };
            vec![task(op).with_changed_fields(event.changed_fields().iter().cloned())]
        }
        Operation::Removed | Operation::Deleted => {
            let op = if mapping.sub_graph_link().is_some() {
                GraphOp::DeleteSubGraphs
            } else if has_dependents {
                GraphOp::DeleteWithRelatedUpdate
            } else {
                GraphOp::Delete
            };
            vec![task(op)]
        }
        Operation::RelatedAdded | Operation::RelatedRemoved | Operation::RelatedChanged => {
            std::iter::once(entity)
                .chain(event.related().iter().copied())
                .filter(|target| registry.mapping(target.kind).is_ok())
                .map(|target| GraphTask::new(GraphOp::Update, target.kind, target.id))
                .collect()
        }
    }
}

/// Search tasks raised by `event`
#[must_use]
pub fn search_tasks(event: &ChangeEvent) -> Vec<SearchTask> {
    let entity = event.entity();
    let related = event.related().iter().copied();
    match event.operation() {
        Operation::Created
        | Operation::Published
        | Operation::Restored
        | Operation::Updated => vec![SearchTask::update(entity).with_related(related)],
        Operation::Removed | Operation::Deleted => {
            vec![SearchTask::remove(entity).with_related(related)]
        }
        Operation::RelatedAdded | Operation::RelatedRemoved | Operation::RelatedChanged => {
            std::iter::once(entity)
                .chain(related)
                .map(SearchTask::update)
                .collect()
        }
    }
}

/// Bus handler that enqueues the tasks of each event
#[derive(Debug, Clone)]
pub struct TaskRouter {
    registry: Arc<GraphRegistry>,
    queue: TaskQueue<SyncTask>,
    graph_policy: RetryPolicy,
    search_policy: RetryPolicy,
}

impl TaskRouter {
    /// Create router
    #[must_use]
    pub fn new(
        registry: Arc<GraphRegistry>,
        queue: TaskQueue<SyncTask>,
        graph_policy: RetryPolicy,
        search_policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            queue,
            graph_policy,
            search_policy,
        }
    }

    /// Every task `event` raises, graph first
    #[must_use]
    pub fn route(&self, event: &ChangeEvent) -> Vec<SyncTask> {
        graph_tasks(event, &self.registry)
            .into_iter()
            .map(SyncTask::from)
            .chain(search_tasks(event).into_iter().map(SyncTask::from))
            .collect()
    }
}

impl Handler for TaskRouter {
    fn name(&self) -> &str {
        "task-router"
    }

    fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError> {
        for task in self.route(event) {
            let policy = if task.is_graph() {
                self.graph_policy.clone()
            } else {
                self.search_policy.clone()
            };
            self.queue
                .enqueue(task, policy)
                .map_err(|e| HandlerError::new(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_graph::UriScheme;
    use odsync_model::{EntityKind, EntityRef, MemoryStore};
    use odsync_rdf::MemoryTripleStore;
    use odsync_search::SearchOp;
    use pretty_assertions::assert_eq;

    fn registry() -> GraphRegistry {
        GraphRegistry::new(
            UriScheme::new("https://data.example.org").unwrap(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryTripleStore::new()),
        )
    }

    fn ops(event: &ChangeEvent) -> Vec<GraphOp> {
        graph_tasks(event, &registry()).iter().map(|t| t.op).collect()
    }

    fn event(kind: EntityKind, op: Operation) -> ChangeEvent {
        ChangeEvent::new(EntityRef::new(kind, 1), op)
    }

    #[test]
    fn graph_routing_table() {
        use EntityKind as K;
        use Operation as O;
        assert_eq!(ops(&event(K::Dataset, O::Published)), vec![GraphOp::CreateWithRelatedUpdate]);
        assert_eq!(ops(&event(K::Resource, O::Created)), vec![GraphOp::Create]);
        assert_eq!(ops(&event(K::License, O::Updated)), vec![GraphOp::UpdateWithRelated]);
        assert_eq!(
            ops(&event(K::Organization, O::Updated)),
            vec![GraphOp::UpdateWithConditionalRelated]
        );
        assert_eq!(ops(&event(K::Resource, O::Updated)), vec![GraphOp::Update]);
        assert_eq!(ops(&event(K::Dataset, O::Removed)), vec![GraphOp::DeleteSubGraphs]);
        assert_eq!(ops(&event(K::Category, O::Deleted)), vec![GraphOp::DeleteWithRelatedUpdate]);
        assert_eq!(ops(&event(K::Resource, O::Deleted)), vec![GraphOp::Delete]);
    }

    #[test]
    fn updates_carry_changed_fields() {
        let update = event(EntityKind::Organization, Operation::Updated).with_changed_fields(["title"]);
        let tasks = graph_tasks(&update, &registry());
        assert_eq!(tasks[0].changed_fields, vec!["title".to_string()]);
    }

    #[test]
    fn relation_changes_touch_both_sides() {
        let category = EntityRef::new(EntityKind::Category, 5);
        let change = event(EntityKind::Dataset, Operation::RelatedAdded).with_related([category]);

        let graph: Vec<EntityRef> = graph_tasks(&change, &registry()).iter().map(|t| t.entity).collect();
        assert_eq!(graph, vec![EntityRef::new(EntityKind::Dataset, 1), category]);

        let search = search_tasks(&change);
        assert_eq!(search.len(), 2);
        assert!(search.iter().all(|t| t.op == SearchOp::UpdateDocument));
    }

    #[test]
    fn removals_keep_related_for_fan_out() {
        let org = EntityRef::new(EntityKind::Organization, 9);
        let deleted = event(EntityKind::Dataset, Operation::Deleted).with_related([org]);
        let search = search_tasks(&deleted);
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].op, SearchOp::RemoveDocument);
        assert_eq!(search[0].related, vec![org]);
    }

    #[test]
    fn unmapped_kinds_raise_no_graph_work() {
        let registry = GraphRegistry::empty(
            UriScheme::new("https://data.example.org").unwrap(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryTripleStore::new()),
        );
        assert!(graph_tasks(&event(EntityKind::Dataset, Operation::Created), &registry).is_empty());
    }
}
