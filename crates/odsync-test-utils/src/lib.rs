//! Testing utilities for the odsync workspace
//!
//! Shared portal fixtures and triple/index inspection helpers.

#![allow(missing_docs)]

use chrono::{DateTime, TimeZone, Utc};
use odsync_model::{
    Category, Dataset, Entity, EntityKind, EntityRef, License, MemoryStore, Organization, Resource,
};
use odsync_rdf::vocab::dct;
use odsync_rdf::{Iri, MemoryTripleStore, Term};
use odsync_search::MemoryIndex;
use std::sync::Arc;

pub const BASE_URI: &str = "https://data.example.org";

pub const ORG: u64 = 1;
pub const LICENSE: u64 = 3;
pub const CATEGORY: u64 = 5;

/// Midnight UTC on the given day
pub fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Subject IRI the default scheme gives `(kind, id)`
pub fn subject(kind: EntityKind, id: u64) -> Iri {
    Iri::from_static(BASE_URI).join(kind.segment()).join(id)
}

/// Catalog subject under the default scheme
pub fn catalog_subject() -> Iri {
    Iri::from_static(BASE_URI).join("catalog")
}

/// Builder for a small portal: one organization, license and category,
/// plus whatever datasets and resources the test adds
#[derive(Debug, Clone)]
pub struct PortalFixture {
    entities: Vec<Entity>,
}

impl Default for PortalFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalFixture {
    pub fn new() -> Self {
        Self {
            entities: vec![
                Organization::new(ORG, "City of Example")
                    .with_website("https://city.example.org")
                    .with_email("data@city.example.org")
                    .into(),
                License::new(LICENSE, "cc-by", "CC-BY 4.0")
                    .with_url("https://creativecommons.org/licenses/by/4.0/")
                    .into(),
                Category::new(CATEGORY, "ENVI", "Environment").into(),
            ],
        }
    }

    /// Published dataset under the fixture organization and license
    pub fn dataset(mut self, id: u64, title: &str, modified: DateTime<Utc>) -> Self {
        let dataset = Dataset::new(id, ORG, title)
            .with_license(LICENSE)
            .with_category(CATEGORY);
        self.entities.push(Entity::from(dataset).created_at(modified));
        self
    }

    /// `count` datasets with ids `first..first + count`, all modified at `modified`
    pub fn datasets(mut self, first: u64, count: u64, modified: DateTime<Utc>) -> Self {
        for id in first..first + count {
            self = self.dataset(id, &format!("Dataset {id}"), modified);
        }
        self
    }

    /// CSV resource of `dataset`
    pub fn resource(mut self, id: u64, dataset: u64) -> Self {
        let link = format!("https://files.example.org/{dataset}/{id}.csv");
        self.entities
            .push(Resource::new(id, dataset, format!("File {id}"), link).with_format("CSV").into());
        self
    }

    /// Any extra row
    pub fn with(mut self, entity: impl Into<Entity>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn into_store(self) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_entities(self.entities))
    }
}

/// Fresh in-memory backends
pub fn memory_backends() -> (Arc<MemoryTripleStore>, Arc<MemoryIndex>) {
    (Arc::new(MemoryTripleStore::new()), Arc::new(MemoryIndex::new()))
}

/// Objects of `predicate` on exactly `subject`
pub fn objects_of(triples: &MemoryTripleStore, subject: &Iri, predicate: &str) -> Vec<Term> {
    triples
        .triples()
        .into_iter()
        .filter(|t| t.subject.as_iri() == Some(subject) && t.predicate.as_str() == predicate)
        .map(|t| t.object)
        .collect()
}

/// Lexical `dct:title` values on exactly `subject`
pub fn titles_of(triples: &MemoryTripleStore, subject: &Iri) -> Vec<String> {
    objects_of(triples, subject, dct::TITLE)
        .iter()
        .filter_map(Term::as_literal)
        .map(|lit| lit.lexical().to_owned())
        .collect()
}

/// Whether the index holds a document for `(kind, id)`
pub fn indexed(index: &MemoryIndex, kind: EntityKind, id: u64) -> bool {
    index.contains(EntityRef::new(kind, id))
}
