//! Graph operations and the task that carries them

use crate::error::GraphError;
use odsync_model::{EntityKind, EntityRef};
use odsync_queue::{QueueTask, TaskLabel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with an entity's subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphOp {
    /// Insert the subject's triples
    Create,
    /// Replace the subject's triples
    Update,
    /// Remove the subject
    Delete,
    /// Insert, then re-derive dependents
    CreateWithRelatedUpdate,
    /// Replace, then re-derive dependents
    UpdateWithRelated,
    /// Replace, then re-derive dependents if a watched field changed
    UpdateWithConditionalRelated,
    /// Remove, then re-derive the supplied (or linked) dependents
    DeleteWithRelatedUpdate,
    /// Remove every child subject, then the subject itself
    DeleteSubGraphs,
}

impl GraphOp {
    /// Every operation
    pub const ALL: [GraphOp; 8] = [
        GraphOp::Create,
        GraphOp::Update,
        GraphOp::Delete,
        GraphOp::CreateWithRelatedUpdate,
        GraphOp::UpdateWithRelated,
        GraphOp::UpdateWithConditionalRelated,
        GraphOp::DeleteWithRelatedUpdate,
        GraphOp::DeleteSubGraphs,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphOp::Create => "create",
            GraphOp::Update => "update",
            GraphOp::Delete => "delete",
            GraphOp::CreateWithRelatedUpdate => "create_with_related_update",
            GraphOp::UpdateWithRelated => "update_with_related",
            GraphOp::UpdateWithConditionalRelated => "update_with_conditional_related",
            GraphOp::DeleteWithRelatedUpdate => "delete_with_related_update",
            GraphOp::DeleteSubGraphs => "delete_sub_graphs",
        }
    }

    /// Removes the subject rather than writing it
    #[inline]
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            GraphOp::Delete | GraphOp::DeleteWithRelatedUpdate | GraphOp::DeleteSubGraphs
        )
    }

    /// Writes the subject without clearing it first
    #[inline]
    #[must_use]
    pub fn is_create(&self) -> bool {
        matches!(self, GraphOp::Create | GraphOp::CreateWithRelatedUpdate)
    }

    /// Touches dependents after the subject
    #[inline]
    #[must_use]
    pub fn cascades(&self) -> bool {
        matches!(
            self,
            GraphOp::CreateWithRelatedUpdate
                | GraphOp::UpdateWithRelated
                | GraphOp::UpdateWithConditionalRelated
                | GraphOp::DeleteWithRelatedUpdate
        )
    }
}

impl fmt::Display for GraphOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphOp {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GraphOp::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| GraphError::UnknownOperation(s.to_string()))
    }
}

/// Deferred graph work for one entity
///
/// Carries identity only; the registry reloads current state when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphTask {
    /// Operation
    pub op: GraphOp,
    /// Target entity
    pub entity: EntityRef,
    /// Explicit dependents to refresh; empty means "look them up"
    #[serde(default)]
    pub related: Vec<EntityRef>,
    /// Fields changed by the triggering edit; empty means unknown
    #[serde(default)]
    pub changed_fields: Vec<String>,
}

impl GraphTask {
    /// Create task
    #[must_use]
    pub fn new(op: GraphOp, kind: EntityKind, id: impl Into<odsync_model::EntityId>) -> Self {
        Self {
            op,
            entity: EntityRef::new(kind, id),
            related: Vec::new(),
            changed_fields: Vec::new(),
        }
    }

    /// With explicit dependents
    #[must_use]
    pub fn with_related(mut self, related: impl IntoIterator<Item = EntityRef>) -> Self {
        self.related.extend(related);
        self
    }

    /// With changed field names
    #[must_use]
    pub fn with_changed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_fields.extend(fields.into_iter().map(Into::into));
        self
    }
}

impl QueueTask for GraphTask {
    fn label(&self) -> TaskLabel {
        TaskLabel {
            task: "graph".to_string(),
            entity_kind: self.entity.kind.label().to_string(),
            entity_id: self.entity.id.get(),
            operation: self.op.as_str().to_string(),
        }
    }
}
