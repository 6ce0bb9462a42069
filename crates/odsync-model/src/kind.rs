//! Entity identity
//!
//! Provides the closed set of synchronized entity kinds and the
//! `(kind, id)` pair that addresses a single row in the relational store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a synchronized domain entity
///
/// The string form (`datasets.Dataset`, ...) is the label used on the wire
/// and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Published dataset, member of the catalog
    #[serde(rename = "datasets.Dataset")]
    Dataset,
    /// Distribution (file or link) belonging to a dataset
    #[serde(rename = "resources.Resource")]
    Resource,
    /// Publisher of datasets
    #[serde(rename = "organizations.Organization")]
    Organization,
    /// License referenced by datasets
    #[serde(rename = "licenses.License")]
    License,
    /// Thematic category referenced by datasets
    #[serde(rename = "categories.Category")]
    Category,
}

impl EntityKind {
    /// Every kind, in a stable order
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Dataset,
        EntityKind::Resource,
        EntityKind::Organization,
        EntityKind::License,
        EntityKind::Category,
    ];

    /// Wire label (`app.Model`)
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Dataset => "datasets.Dataset",
            EntityKind::Resource => "resources.Resource",
            EntityKind::Organization => "organizations.Organization",
            EntityKind::License => "licenses.License",
            EntityKind::Category => "categories.Category",
        }
    }

    /// Lowercase path segment used when minting URIs and index names
    #[inline]
    #[must_use]
    pub fn segment(&self) -> &'static str {
        match self {
            EntityKind::Dataset => "dataset",
            EntityKind::Resource => "resource",
            EntityKind::Organization => "organization",
            EntityKind::License => "license",
            EntityKind::Category => "category",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error for unknown entity kind labels
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind: '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.label() == s || k.segment() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Primary key of an entity within its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Raw key
    #[inline]
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of one entity: kind plus id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind
    pub kind: EntityKind,
    /// Entity id
    pub id: EntityId,
}

impl EntityRef {
    /// Create new reference
    #[inline]
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_label_and_segment() {
        assert_eq!(
            "resources.Resource".parse::<EntityKind>().unwrap(),
            EntityKind::Resource
        );
        assert_eq!("license".parse::<EntityKind>().unwrap(), EntityKind::License);
        assert!("showcases.Showcase".parse::<EntityKind>().is_err());
    }

    #[test]
    fn kind_serializes_as_label() {
        let json = serde_json::to_string(&EntityKind::Organization).unwrap();
        assert_eq!(json, "\"organizations.Organization\"");
    }

    #[test]
    fn entity_ref_display() {
        let r = EntityRef::new(EntityKind::Dataset, 42);
        assert_eq!(r.to_string(), "datasets.Dataset#42");
    }

    #[test]
    fn entity_refs_order_by_kind_then_id() {
        let a = EntityRef::new(EntityKind::Dataset, 9);
        let b = EntityRef::new(EntityKind::Resource, 1);
        assert!(a < b);
        assert!(EntityRef::new(EntityKind::Dataset, 1) < a);
    }
}
