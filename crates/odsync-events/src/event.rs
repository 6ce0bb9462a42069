//! Change events
//!
//! A [`ChangeEvent`] records one committed state transition of an entity.
//! Events are immutable once built and are not persisted.

use chrono::{DateTime, Utc};
use odsync_model::{EntityKind, EntityRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State transition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Row inserted
    Created,
    /// Row fields changed
    Updated,
    /// Row hard-deleted
    Deleted,
    /// Status moved to published
    Published,
    /// Soft-deleted row brought back
    Restored,
    /// Row soft-deleted or unpublished
    Removed,
    /// Many-to-many link added
    RelatedAdded,
    /// Many-to-many link removed
    RelatedRemoved,
    /// Many-to-many link set replaced
    RelatedChanged,
}

impl Operation {
    /// Every operation
    pub const ALL: [Operation; 9] = [
        Operation::Created,
        Operation::Updated,
        Operation::Deleted,
        Operation::Published,
        Operation::Restored,
        Operation::Removed,
        Operation::RelatedAdded,
        Operation::RelatedRemoved,
        Operation::RelatedChanged,
    ];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Created => "created",
            Operation::Updated => "updated",
            Operation::Deleted => "deleted",
            Operation::Published => "published",
            Operation::Restored => "restored",
            Operation::Removed => "removed",
            Operation::RelatedAdded => "related_added",
            Operation::RelatedRemoved => "related_removed",
            Operation::RelatedChanged => "related_changed",
        }
    }

    /// Many-to-many relation change
    #[inline]
    #[must_use]
    pub fn is_relation_change(&self) -> bool {
        matches!(
            self,
            Operation::RelatedAdded | Operation::RelatedRemoved | Operation::RelatedChanged
        )
    }

    /// Transition that takes the entity out of public view
    #[inline]
    #[must_use]
    pub fn is_removal(&self) -> bool {
        matches!(self, Operation::Deleted | Operation::Removed)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = crate::error::EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| crate::error::EventError::UnknownOperation(s.to_string()))
    }
}

/// One committed state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    entity: EntityRef,
    operation: Operation,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    changed_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    related: Vec<EntityRef>,
}

impl ChangeEvent {
    /// Event stamped with the current time
    #[inline]
    #[must_use]
    pub fn new(entity: EntityRef, operation: Operation) -> Self {
        Self::at(entity, operation, Utc::now())
    }

    /// Event stamped with `timestamp`
    #[inline]
    #[must_use]
    pub fn at(entity: EntityRef, operation: Operation, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity,
            operation,
            timestamp,
            changed_fields: Vec::new(),
            related: Vec::new(),
        }
    }

    /// With the names of fields changed by an update
    #[must_use]
    pub fn with_changed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// With entities affected by the transition
    ///
    /// For relation changes this is the counterpart side; for deletions it
    /// is the set of rows that referenced the deleted entity.
    #[must_use]
    pub fn with_related(mut self, related: impl IntoIterator<Item = EntityRef>) -> Self {
        self.related = related.into_iter().collect();
        self
    }

    /// Entity the transition happened to
    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityRef {
        self.entity
    }

    /// Entity kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.entity.kind
    }

    /// Transition kind
    #[inline]
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Commit time
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Fields changed by an update; empty when unknown
    #[inline]
    #[must_use]
    pub fn changed_fields(&self) -> &[String] {
        &self.changed_fields
    }

    /// Related entities
    #[inline]
    #[must_use]
    pub fn related(&self) -> &[EntityRef] {
        &self.related
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_roundtrip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("touched".parse::<Operation>().is_err());
    }

    #[test]
    fn operation_classification() {
        assert!(Operation::RelatedRemoved.is_relation_change());
        assert!(!Operation::Updated.is_relation_change());
        assert!(Operation::Removed.is_removal());
        assert!(!Operation::Restored.is_removal());
    }

    #[test]
    fn event_json_omits_empty_lists() {
        let event = ChangeEvent::new(EntityRef::new(EntityKind::Dataset, 1), Operation::Created);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["operation"], "created");
        assert!(json.get("changed_fields").is_none());

        let parsed: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn event_builder_keeps_context() {
        let event = ChangeEvent::new(EntityRef::new(EntityKind::License, 3), Operation::Deleted)
            .with_related([EntityRef::new(EntityKind::Dataset, 9)])
            .with_changed_fields(["title"]);
        assert_eq!(event.related().len(), 1);
        assert_eq!(event.changed_fields(), ["title".to_string()]);
        assert_eq!(event.kind(), EntityKind::License);
    }
}
