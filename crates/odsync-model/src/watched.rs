//! Fields whose change cascades to dependent entities
//!
//! A conditional related update re-derives dependents only when one of the
//! fields listed here for the changed kind is among the changed fields.
//! A kind mapped to `*` cascades on every change; such entries are reported
//! by [`WatchedFields::cascades_on_all_fields`] so they can be reviewed.

use crate::kind::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Marker meaning "every field"
pub const ALL_FIELDS: &str = "*";

/// Entity kind to watched field names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchedFields {
    table: BTreeMap<EntityKind, BTreeSet<String>>,
}

impl Default for WatchedFields {
    fn default() -> Self {
        Self::empty()
            .watch(
                EntityKind::Organization,
                ["title", "slug", "website", "status", "is_removed"],
            )
            .watch(EntityKind::Category, ["title", "code", "status", "is_removed"])
            .watch(
                EntityKind::Resource,
                ["title", "format", "link", "status", "is_removed", "dataset_id"],
            )
            .watch(EntityKind::Dataset, ["status", "is_removed", "organization_id"])
            .watch_all(EntityKind::License)
    }
}

impl WatchedFields {
    /// No kind cascades conditionally
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Watch `fields` of `kind`
    #[must_use]
    pub fn watch<I, S>(mut self, kind: EntityKind, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .entry(kind)
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Cascade on any change of `kind`
    #[must_use]
    pub fn watch_all(self, kind: EntityKind) -> Self {
        self.watch(kind, [ALL_FIELDS])
    }

    /// Watched field names of `kind`
    #[must_use]
    pub fn fields(&self, kind: EntityKind) -> Option<&BTreeSet<String>> {
        self.table.get(&kind)
    }

    /// Whether a change of `changed` fields on `kind` must cascade
    ///
    /// An empty `changed` list means the change set is unknown and cascades
    /// for every watched kind.
    #[must_use]
    pub fn triggers(&self, kind: EntityKind, changed: &[String]) -> bool {
        match self.table.get(&kind) {
            None => false,
            Some(fields) if fields.contains(ALL_FIELDS) || changed.is_empty() => true,
            Some(fields) => changed.iter().any(|f| fields.contains(f)),
        }
    }

    /// Kinds cascading unconditionally
    #[must_use]
    pub fn cascades_on_all_fields(&self) -> Vec<EntityKind> {
        self.table
            .iter()
            .filter(|(_, fields)| fields.contains(ALL_FIELDS))
            .map(|(kind, _)| *kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| (*f).to_string()).collect()
    }

    #[test]
    fn default_table_flags_license() {
        let watched = WatchedFields::default();
        assert_eq!(watched.cascades_on_all_fields(), vec![EntityKind::License]);
        assert!(watched.triggers(EntityKind::License, &changed(&["url"])));
    }

    #[test]
    fn unwatched_field_does_not_cascade() {
        let watched = WatchedFields::default();
        assert!(!watched.triggers(EntityKind::Organization, &changed(&["description"])));
        assert!(watched.triggers(EntityKind::Organization, &changed(&["description", "title"])));
        assert!(!watched.triggers(EntityKind::Organization, &changed(&["email"])));
    }

    #[test]
    fn visibility_changes_cascade_for_every_parent_kind() {
        let watched = WatchedFields::default();
        for kind in [
            EntityKind::Organization,
            EntityKind::Category,
            EntityKind::Dataset,
            EntityKind::Resource,
        ] {
            assert!(watched.triggers(kind, &changed(&["status"])), "{kind}");
            assert!(watched.triggers(kind, &changed(&["is_removed"])), "{kind}");
        }
    }

    #[test]
    fn unknown_change_set_cascades() {
        let watched = WatchedFields::default();
        assert!(watched.triggers(EntityKind::Category, &[]));
        assert!(!WatchedFields::empty().triggers(EntityKind::Category, &[]));
    }

    #[test]
    fn deserializes_from_kind_table() {
        let watched: WatchedFields = serde_json::from_str(
            r#"{"licenses.License": ["*"], "organizations.Organization": ["title"]}"#,
        )
        .unwrap();
        assert_eq!(watched.cascades_on_all_fields(), vec![EntityKind::License]);
        assert!(watched.triggers(EntityKind::Organization, &changed(&["title"])));
    }
}
