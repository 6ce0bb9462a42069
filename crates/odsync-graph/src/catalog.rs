//! Catalog modified-timestamp aggregation
//!
//! The catalog subject carries a single `dct:modified` value equal to the
//! newest `modified` among its visible datasets. The value is always
//! recomputed from the member set and written with delete-then-insert, so a
//! removal can lower it.

use crate::error::GraphError;
use crate::uri::UriScheme;
use chrono::{DateTime, Utc};
use odsync_model::{Entity, EntityKind, EntityStore};
use odsync_rdf::vocab::{dcat, dct, rdf};
use odsync_rdf::{Iri, Literal, SparqlUpdate, Term, TripleStore, UpdateOp};
use std::sync::Arc;

/// Default catalog title
pub const DEFAULT_CATALOG_TITLE: &str = "Open data catalog";

/// Member set to aggregate over
#[derive(Debug, Clone, Copy)]
pub enum CatalogMembers<'a> {
    /// One dataset is the whole member set
    Instance(&'a Entity),
    /// `MAX(modified)` over every visible dataset in the store
    Aggregate,
}

/// Maintains the catalog's `dct:modified`
#[derive(Debug, Clone)]
pub struct CatalogAggregator {
    subject: Iri,
    title: String,
    store: Arc<dyn EntityStore>,
    triples: Arc<dyn TripleStore>,
}

impl CatalogAggregator {
    /// Aggregator for the catalog minted by `scheme`
    #[must_use]
    pub fn new(scheme: &UriScheme, store: Arc<dyn EntityStore>, triples: Arc<dyn TripleStore>) -> Self {
        Self {
            subject: scheme.catalog(),
            title: DEFAULT_CATALOG_TITLE.to_string(),
            store,
            triples,
        }
    }

    /// With catalog title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Catalog subject
    #[inline]
    #[must_use]
    pub fn subject(&self) -> &Iri {
        &self.subject
    }

    /// Recompute and store the catalog's modified timestamp
    ///
    /// Returns the value written; `None` clears it (empty catalog).
    ///
    /// # Errors
    /// Store read failures and triple store failures.
    pub async fn update_catalog_modified(
        &self,
        members: CatalogMembers<'_>,
    ) -> Result<Option<DateTime<Utc>>, GraphError> {
        let modified = match members {
            CatalogMembers::Instance(entity) => {
                (entity.kind() == EntityKind::Dataset && entity.is_visible()).then(|| entity.modified())
            }
            CatalogMembers::Aggregate => self.store.catalog_modified().await?,
        };
        self.triples.update(&self.catalog_update(modified)).await?;
        tracing::debug!(
            catalog = %self.subject,
            modified = ?modified,
            "catalog modified recomputed"
        );
        Ok(modified)
    }

    /// Update replacing the catalog header and its `dct:modified`
    #[must_use]
    pub fn catalog_update(&self, modified: Option<DateTime<Utc>>) -> SparqlUpdate {
        let replace = |predicate: &'static str, objects: Vec<Term>| UpdateOp::ReplaceObjects {
            subject: self.subject.clone(),
            predicate: Iri::from_static(predicate),
            objects,
        };
        SparqlUpdate::new()
            .then(replace(rdf::TYPE, vec![Iri::from_static(dcat::CATALOG).into()]))
            .then(replace(dct::TITLE, vec![Literal::string(&self.title).into()]))
            .then(replace(
                dct::MODIFIED,
                modified.map(Literal::date_time).map(Term::from).into_iter().collect(),
            ))
    }

    /// Current value held in the triple store
    ///
    /// # Errors
    /// Triple store failures.
    pub async fn catalog_modified(&self) -> Result<Option<DateTime<Utc>>, GraphError> {
        let values = self
            .triples
            .objects(&self.subject, &Iri::from_static(dct::MODIFIED))
            .await?;
        Ok(values
            .iter()
            .filter_map(Term::as_literal)
            .filter_map(Literal::as_date_time)
            .max())
    }
}
