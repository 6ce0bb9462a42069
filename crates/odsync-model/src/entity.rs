//! Domain records
//!
//! Typed rows of the relational store that the pipeline projects into the
//! triple store and the search index. Every record shares a [`Lifecycle`]
//! block carrying publication state and timestamps.

use crate::kind::{EntityId, EntityKind, EntityRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Visible to the public
    #[default]
    Published,
    /// Work in progress, hidden
    Draft,
}

/// Publication state and timestamps shared by every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Publication status
    pub status: Status,
    /// Soft-delete flag
    pub is_removed: bool,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

impl Lifecycle {
    /// Published, not removed, created and modified at `at`
    #[inline]
    #[must_use]
    pub fn published_at(at: DateTime<Utc>) -> Self {
        Self {
            status: Status::Published,
            is_removed: false,
            created: at,
            modified: at,
        }
    }

    /// Whether the row should be visible in the graph and the index
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.status == Status::Published && !self.is_removed
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::published_at(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Dataset row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: EntityId,
    pub title: String,
    pub slug: String,
    pub notes: Option<String>,
    pub organization_id: EntityId,
    pub license_id: Option<EntityId>,
    pub category_ids: Vec<EntityId>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Dataset {
    /// Create published dataset owned by `organization_id`
    #[must_use]
    pub fn new(id: impl Into<EntityId>, organization_id: impl Into<EntityId>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            slug: slugify(&title),
            title,
            notes: None,
            organization_id: organization_id.into(),
            license_id: None,
            category_ids: Vec::new(),
            tags: Vec::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// With license
    #[inline]
    #[must_use]
    pub fn with_license(mut self, license_id: impl Into<EntityId>) -> Self {
        self.license_id = Some(license_id.into());
        self
    }

    /// With category
    #[inline]
    #[must_use]
    pub fn with_category(mut self, category_id: impl Into<EntityId>) -> Self {
        self.category_ids.push(category_id.into());
        self
    }

    /// With tag
    #[inline]
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// With notes
    #[inline]
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Resource row (a distribution of a dataset)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: EntityId,
    pub dataset_id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub format: Option<String>,
    pub link: String,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Resource {
    /// Create published resource under `dataset_id`
    #[must_use]
    pub fn new(
        id: impl Into<EntityId>,
        dataset_id: impl Into<EntityId>,
        title: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            dataset_id: dataset_id.into(),
            title: title.into(),
            description: None,
            format: None,
            link: link.into(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// With file format
    #[inline]
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Organization row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: EntityId,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Organization {
    /// Create published organization
    #[must_use]
    pub fn new(id: impl Into<EntityId>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            slug: slugify(&title),
            title,
            description: None,
            website: None,
            email: None,
            lifecycle: Lifecycle::default(),
        }
    }

    /// With website
    #[inline]
    #[must_use]
    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    /// With contact e-mail
    #[inline]
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// License row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: EntityId,
    /// Short code, e.g. `CC-BY-4.0`
    pub name: String,
    pub title: String,
    pub url: Option<String>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl License {
    /// Create published license
    #[must_use]
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: title.into(),
            url: None,
            lifecycle: Lifecycle::default(),
        }
    }

    /// With license text URL
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Category row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    pub code: String,
    pub title: String,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Category {
    /// Create published category
    #[must_use]
    pub fn new(id: impl Into<EntityId>, code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            title: title.into(),
            lifecycle: Lifecycle::default(),
        }
    }
}

/// Any synchronized row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Entity {
    #[serde(rename = "datasets.Dataset")]
    Dataset(Dataset),
    #[serde(rename = "resources.Resource")]
    Resource(Resource),
    #[serde(rename = "organizations.Organization")]
    Organization(Organization),
    #[serde(rename = "licenses.License")]
    License(License),
    #[serde(rename = "categories.Category")]
    Category(Category),
}

impl Entity {
    /// Entity kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Dataset(_) => EntityKind::Dataset,
            Entity::Resource(_) => EntityKind::Resource,
            Entity::Organization(_) => EntityKind::Organization,
            Entity::License(_) => EntityKind::License,
            Entity::Category(_) => EntityKind::Category,
        }
    }

    /// Entity id
    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Dataset(e) => e.id,
            Entity::Resource(e) => e.id,
            Entity::Organization(e) => e.id,
            Entity::License(e) => e.id,
            Entity::Category(e) => e.id,
        }
    }

    /// `(kind, id)` address
    #[inline]
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }

    /// Shared lifecycle block
    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        match self {
            Entity::Dataset(e) => &e.lifecycle,
            Entity::Resource(e) => &e.lifecycle,
            Entity::Organization(e) => &e.lifecycle,
            Entity::License(e) => &e.lifecycle,
            Entity::Category(e) => &e.lifecycle,
        }
    }

    /// Mutable lifecycle block
    #[inline]
    pub fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        match self {
            Entity::Dataset(e) => &mut e.lifecycle,
            Entity::Resource(e) => &mut e.lifecycle,
            Entity::Organization(e) => &mut e.lifecycle,
            Entity::License(e) => &mut e.lifecycle,
            Entity::Category(e) => &mut e.lifecycle,
        }
    }

    /// Last modification time
    #[inline]
    #[must_use]
    pub fn modified(&self) -> DateTime<Utc> {
        self.lifecycle().modified
    }

    /// Published and not soft-deleted
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.lifecycle().is_visible()
    }

    /// Human readable title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Entity::Dataset(e) => &e.title,
            Entity::Resource(e) => &e.title,
            Entity::Organization(e) => &e.title,
            Entity::License(e) => &e.title,
            Entity::Category(e) => &e.title,
        }
    }

    /// Set modification time
    #[inline]
    #[must_use]
    pub fn with_modified(mut self, at: DateTime<Utc>) -> Self {
        self.lifecycle_mut().modified = at;
        self
    }

    /// Set creation and modification time
    #[inline]
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        let lifecycle = self.lifecycle_mut();
        lifecycle.created = at;
        lifecycle.modified = at;
        self
    }

    /// Set publication status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.lifecycle_mut().status = status;
        self
    }

    /// Field-level view used for change tracking
    #[must_use]
    pub fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("kind");
                map
            }
            _ => serde_json::Map::new(),
        }
    }

    /// Names of the fields whose values differ between `self` and `newer`
    ///
    /// Returns every field of `newer` when the kinds differ.
    #[must_use]
    pub fn changed_fields(&self, newer: &Entity) -> Vec<String> {
        let after = newer.fields();
        if self.kind() != newer.kind() {
            return after.keys().cloned().collect();
        }
        let before = self.fields();
        let mut changed: Vec<String> = after
            .iter()
            .filter(|(key, value)| before.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(before.keys().filter(|k| !after.contains_key(*k)).cloned());
        changed.sort();
        changed
    }
}

macro_rules! impl_from_record {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Entity::$variant(value)
                }
            }
        )*
    };
}

impl_from_record!(Dataset, Resource, Organization, License, Category);

/// Lowercase, dash separated, ASCII alphanumerics only
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Air Quality -- 2024!"), "air-quality-2024");
        assert_eq!(slugify("  "), "");
    }

    #[test]
    fn visibility_follows_status_and_removal() {
        let mut entity: Entity = Dataset::new(1, 1, "d").into();
        assert!(entity.is_visible());

        entity = entity.with_status(Status::Draft);
        assert!(!entity.is_visible());

        let mut removed: Entity = Dataset::new(2, 1, "d").into();
        removed.lifecycle_mut().is_removed = true;
        assert!(!removed.is_visible());
    }

    #[test]
    fn changed_fields_lists_differences() {
        let before: Entity = Organization::new(3, "Ministry").into();
        let after: Entity = Organization::new(3, "Ministry")
            .with_website("https://gov.example")
            .into();
        let after = after.with_modified(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        assert_eq!(
            before.changed_fields(&after),
            vec!["modified".to_string(), "website".to_string()]
        );
        assert!(after.changed_fields(&after).is_empty());
    }

    #[test]
    fn fields_flatten_lifecycle() {
        let entity: Entity = License::new(1, "CC-BY-4.0", "Attribution").into();
        let fields = entity.fields();
        assert!(fields.contains_key("status"));
        assert!(fields.contains_key("is_removed"));
        assert!(!fields.contains_key("kind"));
        assert!(!fields.contains_key("lifecycle"));
    }

    #[test]
    fn entity_roundtrips_through_tagged_json() {
        let entity: Entity = Resource::new(5, 1, "csv", "https://x/y.csv")
            .with_format("csv")
            .into();
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["kind"], "resources.Resource");
        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }
}
