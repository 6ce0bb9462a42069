//! Per-kind graph mappings
//!
//! A [`GraphMapping`] turns one entity row into its triple set. The subject
//! and every `#fragment` sub-node are derived from the entity's identity, so
//! re-running a mapping on unchanged state produces the same set.
//!
//! Fields of related entities embedded in a subject (a dataset's license
//! title, its publisher name) live on fragment nodes, e.g.
//! `{dataset}#license`; they are replaced together with the subject.

use crate::error::MappingError;
use crate::uri::UriScheme;
use odsync_model::{Entity, EntityId, EntityKind, EntityRef, RelatedEntities};
use odsync_rdf::vocab::{dcat, dct, foaf, rdf, rdfs, schema, skos, vcard};
use odsync_rdf::{Iri, Literal, Term, Triple};
use std::fmt;

/// Everything a mapping may consult besides the row itself
#[derive(Debug, Clone, Copy)]
pub struct MappingContext<'a> {
    scheme: &'a UriScheme,
    related: &'a RelatedEntities,
}

impl<'a> MappingContext<'a> {
    /// Create context
    #[inline]
    #[must_use]
    pub fn new(scheme: &'a UriScheme, related: &'a RelatedEntities) -> Self {
        Self { scheme, related }
    }

    /// URI scheme
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> &'a UriScheme {
        self.scheme
    }

    /// Related rows
    #[inline]
    #[must_use]
    pub fn related(&self) -> &'a RelatedEntities {
        self.related
    }

    /// Subject of any entity
    #[inline]
    #[must_use]
    pub fn subject(&self, entity: EntityRef) -> Iri {
        self.scheme.subject(entity)
    }
}

/// Field-to-predicate mapping for one entity kind
pub trait GraphMapping: Send + Sync + fmt::Debug {
    /// Kind handled
    fn kind(&self) -> EntityKind;

    /// Kinds loaded into the [`MappingContext`] before [`GraphMapping::to_triples`]
    fn context_kinds(&self) -> &'static [EntityKind] {
        &[]
    }

    /// Kinds whose triples embed data of this kind
    fn dependents(&self) -> &'static [EntityKind] {
        &[]
    }

    /// Predicate linking this subject to child subjects removed with it
    fn sub_graph_link(&self) -> Option<Iri> {
        None
    }

    /// Whether rows of this kind are catalog members
    fn in_catalog(&self) -> bool {
        false
    }

    /// Whether every link pointing at this subject is emitted by this
    /// mapping, so an update may drop inbound links before re-inserting
    fn owns_inbound_links(&self) -> bool {
        false
    }

    /// Subject of the row with `id`
    fn subject_for(&self, scheme: &UriScheme, id: EntityId) -> Iri {
        scheme.subject(EntityRef::new(self.kind(), id))
    }

    /// Whether the row belongs in the graph at all
    fn is_published(&self, entity: &Entity, _ctx: &MappingContext<'_>) -> bool {
        entity.is_visible()
    }

    /// Full triple set of a published row
    ///
    /// # Errors
    /// `MappingError` when a required field is missing or malformed.
    fn to_triples(&self, entity: &Entity, ctx: &MappingContext<'_>) -> Result<Vec<Triple>, MappingError>;
}

/// Every built-in mapping
#[must_use]
pub fn default_mappings() -> Vec<std::sync::Arc<dyn GraphMapping>> {
    vec![
        std::sync::Arc::new(DatasetGraph),
        std::sync::Arc::new(ResourceGraph),
        std::sync::Arc::new(OrganizationGraph),
        std::sync::Arc::new(LicenseGraph),
        std::sync::Arc::new(CategoryGraph),
    ]
}

struct Triples {
    out: Vec<Triple>,
}

impl Triples {
    fn new() -> Self {
        Self { out: Vec::new() }
    }

    fn add(&mut self, subject: &Iri, predicate: &'static str, object: impl Into<Term>) -> &mut Self {
        self.out
            .push(Triple::new(subject.clone(), Iri::from_static(predicate), object));
        self
    }

    fn class(&mut self, subject: &Iri, class: &'static str) -> &mut Self {
        self.add(subject, rdf::TYPE, Iri::from_static(class))
    }

    fn text(&mut self, subject: &Iri, predicate: &'static str, value: &str) -> &mut Self {
        self.add(subject, predicate, Literal::string(value))
    }

    fn opt_text(&mut self, subject: &Iri, predicate: &'static str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            self.text(subject, predicate, v);
        }
        self
    }

    fn opt_iri(&mut self, subject: &Iri, predicate: &'static str, value: Option<&str>) -> &mut Self {
        match value.filter(|v| !v.trim().is_empty()).map(Iri::new) {
            Some(Ok(iri)) => {
                self.add(subject, predicate, iri);
            }
            Some(Err(err)) => {
                tracing::debug!(subject = %subject, predicate, error = %err, "skipping malformed optional IRI");
            }
            None => {}
        }
        self
    }

    fn lifecycle(&mut self, subject: &Iri, entity: &Entity) -> &mut Self {
        let lifecycle = entity.lifecycle();
        self.add(subject, dct::ISSUED, Literal::date_time(lifecycle.created))
            .add(subject, dct::MODIFIED, Literal::date_time(lifecycle.modified))
    }

    fn finish(self) -> Vec<Triple> {
        self.out
    }
}

fn required<'e>(entity: &Entity, field: &'static str, value: &'e str) -> Result<&'e str, MappingError> {
    if value.trim().is_empty() {
        Err(MappingError::MissingField {
            entity: entity.entity_ref(),
            field,
        })
    } else {
        Ok(value)
    }
}

fn mismatch(expected: EntityKind, entity: &Entity) -> MappingError {
    MappingError::KindMismatch {
        expected,
        found: entity.kind(),
    }
}

/// `dcat:Dataset`, member of the catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetGraph;

impl GraphMapping for DatasetGraph {
    fn kind(&self) -> EntityKind {
        EntityKind::Dataset
    }

    fn context_kinds(&self) -> &'static [EntityKind] {
        &[
            EntityKind::Organization,
            EntityKind::License,
            EntityKind::Category,
            EntityKind::Resource,
        ]
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Resource]
    }

    fn sub_graph_link(&self) -> Option<Iri> {
        Some(Iri::from_static(dcat::DISTRIBUTION))
    }

    fn in_catalog(&self) -> bool {
        true
    }

    fn owns_inbound_links(&self) -> bool {
        true
    }

    fn to_triples(&self, entity: &Entity, ctx: &MappingContext<'_>) -> Result<Vec<Triple>, MappingError> {
        let Entity::Dataset(ds) = entity else {
            return Err(mismatch(self.kind(), entity));
        };
        let s = ctx.subject(entity.entity_ref());
        let title = required(entity, "title", &ds.title)?;
        let related = ctx.related();

        let mut t = Triples::new();
        t.add(&ctx.scheme().catalog(), dcat::DATASET, s.clone())
            .class(&s, dcat::DATASET_CLASS)
            .text(&s, dct::IDENTIFIER, &ds.id.to_string())
            .text(&s, dct::TITLE, title)
            .opt_text(&s, dct::DESCRIPTION, ds.notes.as_deref())
            .lifecycle(&s, entity);
        for tag in &ds.tags {
            t.text(&s, dcat::KEYWORD, tag);
        }

        if let Some(Entity::Organization(org)) = related.get(EntityKind::Organization, ds.organization_id) {
            let node = s.fragment("publisher");
            t.add(&s, dct::PUBLISHER, node.clone())
                .class(&node, foaf::ORGANIZATION)
                .text(&node, foaf::NAME, &org.title)
                .opt_iri(&node, foaf::HOMEPAGE, org.website.as_deref())
                .add(&node, rdfs::SEE_ALSO, ctx.subject(EntityRef::new(EntityKind::Organization, org.id)));
        }

        if let Some(Entity::License(license)) = ds
            .license_id
            .and_then(|id| related.get(EntityKind::License, id))
        {
            let node = s.fragment("license");
            t.add(&s, dct::LICENSE, node.clone())
                .class(&node, dct::LICENSE_DOCUMENT)
                .text(&node, dct::TITLE, &license.title)
                .opt_iri(&node, schema::URL, license.url.as_deref())
                .add(&node, rdfs::SEE_ALSO, ctx.subject(EntityRef::new(EntityKind::License, license.id)));
        }

        for category_id in &ds.category_ids {
            if let Some(Entity::Category(category)) = related.get(EntityKind::Category, *category_id) {
                let node = s.fragment(&format!("theme-{}", category.id));
                t.add(&s, dcat::THEME, node.clone())
                    .class(&node, skos::CONCEPT)
                    .text(&node, skos::PREF_LABEL, &category.title)
                    .text(&node, skos::NOTATION, &category.code)
                    .add(&node, rdfs::SEE_ALSO, ctx.subject(EntityRef::new(EntityKind::Category, category.id)));
            }
        }

        for resource in related.of_kind(EntityKind::Resource) {
            t.add(&s, dcat::DISTRIBUTION, ctx.subject(resource.entity_ref()));
        }

        Ok(t.finish())
    }
}

/// `dcat:Distribution`; published only while its dataset is
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceGraph;

impl GraphMapping for ResourceGraph {
    fn kind(&self) -> EntityKind {
        EntityKind::Resource
    }

    fn context_kinds(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn owns_inbound_links(&self) -> bool {
        true
    }

    fn is_published(&self, entity: &Entity, ctx: &MappingContext<'_>) -> bool {
        match entity {
            Entity::Resource(r) => {
                entity.is_visible()
                    && ctx
                        .related()
                        .get(EntityKind::Dataset, r.dataset_id)
                        .is_some_and(Entity::is_visible)
            }
            _ => false,
        }
    }

    fn to_triples(&self, entity: &Entity, ctx: &MappingContext<'_>) -> Result<Vec<Triple>, MappingError> {
        let Entity::Resource(res) = entity else {
            return Err(mismatch(self.kind(), entity));
        };
        let s = ctx.subject(entity.entity_ref());
        let title = required(entity, "title", &res.title)?;
        let link = Iri::new(required(entity, "link", &res.link)?).map_err(|source| {
            MappingError::InvalidIri {
                entity: entity.entity_ref(),
                field: "link",
                source,
            }
        })?;

        let mut t = Triples::new();
        t.class(&s, dcat::DISTRIBUTION_CLASS)
            .text(&s, dct::IDENTIFIER, &res.id.to_string())
            .text(&s, dct::TITLE, title)
            .opt_text(&s, dct::DESCRIPTION, res.description.as_deref())
            .opt_text(&s, dct::FORMAT, res.format.as_deref())
            .add(&s, dcat::ACCESS_URL, link)
            .lifecycle(&s, entity);
        if ctx.related().get(EntityKind::Dataset, res.dataset_id).is_some() {
            let parent = ctx.subject(EntityRef::new(EntityKind::Dataset, res.dataset_id));
            t.add(&parent, dcat::DISTRIBUTION, s.clone());
        }
        Ok(t.finish())
    }
}

/// `foaf:Organization` with a vCard contact point
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationGraph;

impl GraphMapping for OrganizationGraph {
    fn kind(&self) -> EntityKind {
        EntityKind::Organization
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn to_triples(&self, entity: &Entity, ctx: &MappingContext<'_>) -> Result<Vec<Triple>, MappingError> {
        let Entity::Organization(org) = entity else {
            return Err(mismatch(self.kind(), entity));
        };
        let s = ctx.subject(entity.entity_ref());
        let title = required(entity, "title", &org.title)?;

        let mut t = Triples::new();
        t.class(&s, foaf::ORGANIZATION)
            .text(&s, dct::IDENTIFIER, &org.slug)
            .text(&s, foaf::NAME, title)
            .opt_text(&s, dct::DESCRIPTION, org.description.as_deref())
            .opt_iri(&s, foaf::HOMEPAGE, org.website.as_deref())
            .add(&s, dct::MODIFIED, Literal::date_time(org.lifecycle.modified));

        let contact = s.fragment("contact");
        t.add(&s, dcat::CONTACT_POINT, contact.clone())
            .class(&contact, vcard::KIND)
            .text(&contact, vcard::FN, title)
            .opt_iri(
                &contact,
                vcard::HAS_EMAIL,
                org.email.as_deref().map(|e| format!("mailto:{e}")).as_deref(),
            );
        Ok(t.finish())
    }
}

/// `dct:LicenseDocument`
#[derive(Debug, Clone, Copy, Default)]
pub struct LicenseGraph;

impl GraphMapping for LicenseGraph {
    fn kind(&self) -> EntityKind {
        EntityKind::License
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn to_triples(&self, entity: &Entity, ctx: &MappingContext<'_>) -> Result<Vec<Triple>, MappingError> {
        let Entity::License(license) = entity else {
            return Err(mismatch(self.kind(), entity));
        };
        let s = ctx.subject(entity.entity_ref());
        let mut t = Triples::new();
        t.class(&s, dct::LICENSE_DOCUMENT)
            .text(&s, dct::IDENTIFIER, required(entity, "name", &license.name)?)
            .text(&s, dct::TITLE, required(entity, "title", &license.title)?)
            .opt_iri(&s, schema::URL, license.url.as_deref());
        Ok(t.finish())
    }
}

/// `skos:Concept` used as a dataset theme
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryGraph;

impl GraphMapping for CategoryGraph {
    fn kind(&self) -> EntityKind {
        EntityKind::Category
    }

    fn dependents(&self) -> &'static [EntityKind] {
        &[EntityKind::Dataset]
    }

    fn to_triples(&self, entity: &Entity, ctx: &MappingContext<'_>) -> Result<Vec<Triple>, MappingError> {
        let Entity::Category(category) = entity else {
            return Err(mismatch(self.kind(), entity));
        };
        let s = ctx.subject(entity.entity_ref());
        let mut t = Triples::new();
        t.class(&s, skos::CONCEPT)
            .text(&s, skos::PREF_LABEL, required(entity, "title", &category.title)?)
            .text(&s, skos::NOTATION, &category.code);
        Ok(t.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use odsync_model::{Category, Dataset, License, Organization, Resource};

    fn scheme() -> UriScheme {
        UriScheme::new("https://data.example.org").unwrap()
    }

    fn titles_of(triples: &[Triple], subject: &Iri) -> Vec<String> {
        triples
            .iter()
            .filter(|t| t.subject == Term::Iri(subject.clone()) && t.predicate.as_str() == dct::TITLE)
            .filter_map(|t| t.object.as_literal().map(|l| l.lexical().to_string()))
            .collect()
    }

    #[test]
    fn dataset_embeds_license_publisher_and_themes() {
        let scheme = scheme();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let dataset: Entity = Dataset::new(7, 1, "Air quality")
            .with_license(3)
            .with_category(5)
            .with_tag("air")
            .into();
        let dataset = dataset.created_at(at);
        let related: RelatedEntities = [
            Organization::new(1, "City").into(),
            License::new(3, "cc-by", "CC-BY 4.0").into(),
            Category::new(5, "ENVI", "Environment").into(),
            Resource::new(9, 7, "CSV", "https://files.example.org/air.csv").into(),
        ]
        .into_iter()
        .collect();
        let ctx = MappingContext::new(&scheme, &related);

        let triples = DatasetGraph.to_triples(&dataset, &ctx).unwrap();
        let s = scheme.subject(dataset.entity_ref());

        assert_eq!(titles_of(&triples, &s), vec!["Air quality"]);
        assert_eq!(titles_of(&triples, &s.fragment("license")), vec!["CC-BY 4.0"]);
        assert!(triples.contains(&Triple::new(
            scheme.catalog(),
            Iri::from_static(dcat::DATASET),
            s.clone()
        )));
        assert!(triples.contains(&Triple::new(
            s.clone(),
            Iri::from_static(dcat::DISTRIBUTION),
            scheme.subject(EntityRef::new(EntityKind::Resource, 9))
        )));
        assert!(triples.contains(&Triple::new(
            s.fragment("theme-5"),
            Iri::from_static(skos::PREF_LABEL),
            Literal::string("Environment")
        )));
        assert!(triples.contains(&Triple::new(
            s,
            Iri::from_static(dct::MODIFIED),
            Literal::date_time(at)
        )));
    }

    #[test]
    fn mapping_is_deterministic() {
        let scheme = scheme();
        let related = RelatedEntities::new();
        let ctx = MappingContext::new(&scheme, &related);
        let dataset: Entity = Dataset::new(1, 1, "City spending").into();
        assert_eq!(
            DatasetGraph.to_triples(&dataset, &ctx).unwrap(),
            DatasetGraph.to_triples(&dataset, &ctx).unwrap()
        );
    }

    #[test]
    fn resource_requires_valid_link() {
        let scheme = scheme();
        let related = RelatedEntities::new();
        let ctx = MappingContext::new(&scheme, &related);
        let resource: Entity = Resource::new(1, 1, "CSV", "not a link").into();
        assert!(matches!(
            ResourceGraph.to_triples(&resource, &ctx),
            Err(MappingError::InvalidIri { field: "link", .. })
        ));
    }

    #[test]
    fn missing_title_is_a_mapping_error() {
        let scheme = scheme();
        let related = RelatedEntities::new();
        let ctx = MappingContext::new(&scheme, &related);
        let license: Entity = License::new(1, "cc0", "  ").into();
        assert!(matches!(
            LicenseGraph.to_triples(&license, &ctx),
            Err(MappingError::MissingField { field: "title", .. })
        ));
    }

    #[test]
    fn resource_of_hidden_dataset_is_not_published() {
        let scheme = scheme();
        let resource: Entity = Resource::new(1, 7, "CSV", "https://x.org/a.csv").into();

        let empty = RelatedEntities::new();
        assert!(!ResourceGraph.is_published(&resource, &MappingContext::new(&scheme, &empty)));

        let with_parent: RelatedEntities = [Dataset::new(7, 1, "Air").into()].into_iter().collect();
        assert!(ResourceGraph.is_published(&resource, &MappingContext::new(&scheme, &with_parent)));
    }

    #[test]
    fn mapping_rejects_other_kinds() {
        let scheme = scheme();
        let related = RelatedEntities::new();
        let ctx = MappingContext::new(&scheme, &related);
        let license: Entity = License::new(1, "cc0", "CC0").into();
        assert!(matches!(
            CategoryGraph.to_triples(&license, &ctx),
            Err(MappingError::KindMismatch { .. })
        ));
    }
}
