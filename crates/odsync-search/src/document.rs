//! Search documents and index operations

use odsync_model::{EntityId, EntityKind, EntityRef};
use odsync_queue::{QueueTask, TaskLabel};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Denormalized projection of one entity
///
/// Always rebuilt in full from current state; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Entity kind, selects the index
    pub kind: EntityKind,
    /// Entity id, the document id
    pub id: EntityId,
    /// Indexed body
    pub body: Map<String, Value>,
}

impl SearchDocument {
    /// Create document
    #[must_use]
    pub fn new(kind: EntityKind, id: EntityId, body: Map<String, Value>) -> Self {
        Self { kind, id, body }
    }

    /// `(kind, id)` address
    #[inline]
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }

    /// Field value
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Hex BLAKE3 digest of the body
    ///
    /// Object keys are sorted, so equal bodies hash equally whatever order
    /// the index returned them in.
    #[must_use]
    pub fn checksum(&self) -> String {
        let canonical = serde_json::to_vec(&canonicalize(&Value::Object(self.body.clone())))
            .unwrap_or_default();
        hex::encode(blake3::hash(&canonical).as_bytes())
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// One item of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOp {
    /// Create or replace the document
    Index(SearchDocument),
    /// Remove the document; absent documents are not an error
    Delete(EntityRef),
}

impl BulkOp {
    /// Address of the affected document
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            BulkOp::Index(doc) => doc.entity_ref(),
            BulkOp::Delete(entity) => *entity,
        }
    }
}

/// Search-side operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOp {
    /// Rebuild and upsert, or remove when no longer visible
    UpdateDocument,
    /// Remove by id
    RemoveDocument,
}

impl SearchOp {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOp::UpdateDocument => "update_document",
            SearchOp::RemoveDocument => "remove_document",
        }
    }
}

impl fmt::Display for SearchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deferred search work for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTask {
    /// Operation
    pub op: SearchOp,
    /// Target entity
    pub entity: EntityRef,
    /// Documents embedding the target, known when the task was raised
    #[serde(default)]
    pub related: Vec<EntityRef>,
}

impl SearchTask {
    /// Rebuild the document of `entity`
    #[must_use]
    pub fn update(entity: EntityRef) -> Self {
        Self {
            op: SearchOp::UpdateDocument,
            entity,
            related: Vec::new(),
        }
    }

    /// Remove the document of `entity`
    #[must_use]
    pub fn remove(entity: EntityRef) -> Self {
        Self {
            op: SearchOp::RemoveDocument,
            entity,
            related: Vec::new(),
        }
    }

    /// With fan-out targets that may no longer be discoverable from the store
    #[must_use]
    pub fn with_related(mut self, related: impl IntoIterator<Item = EntityRef>) -> Self {
        self.related.extend(related);
        self
    }
}

impl QueueTask for SearchTask {
    fn label(&self) -> TaskLabel {
        TaskLabel {
            task: "search".to_string(),
            entity_kind: self.entity.kind.label().to_string(),
            entity_id: self.entity.id.get(),
            operation: self.op.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(body: Value) -> SearchDocument {
        let Value::Object(map) = body else {
            panic!("object expected");
        };
        SearchDocument::new(EntityKind::Dataset, EntityId(1), map)
    }

    #[test]
    fn checksum_ignores_key_order() {
        let a = doc(json!({"title": "Air", "organization": {"id": 1, "title": "City"}}));
        let b = doc(json!({"organization": {"title": "City", "id": 1}, "title": "Air"}));
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);
    }

    #[test]
    fn checksum_detects_changed_values() {
        let a = doc(json!({"title": "Air"}));
        let b = doc(json!({"title": "Air quality"}));
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn task_label() {
        let task = SearchTask::remove(EntityRef::new(EntityKind::Organization, 4));
        assert_eq!(
            task.label().to_string(),
            "search:remove_document(organizations.Organization#4)"
        );
    }
}
