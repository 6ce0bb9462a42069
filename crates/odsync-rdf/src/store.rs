//! Triple store interface and in-memory implementation

use crate::error::TripleStoreError;
use crate::term::{Iri, Term, Triple};
use crate::update::{SparqlUpdate, UpdateOp};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Narrow interface to an RDF store
///
/// Each call is one request; implementations never hold a lock across the
/// network round trip.
#[async_trait]
pub trait TripleStore: Send + Sync + std::fmt::Debug {
    /// Apply an update atomically
    ///
    /// # Errors
    /// Transport or endpoint failure, classified by [`TripleStoreError`].
    async fn update(&self, update: &SparqlUpdate) -> Result<(), TripleStoreError>;

    /// Values of `predicate` on `subject`
    ///
    /// # Errors
    /// Transport or endpoint failure, or an undecodable result set.
    async fn objects(&self, subject: &Iri, predicate: &Iri) -> Result<Vec<Term>, TripleStoreError>;
}

/// Set-semantics store held in process memory
#[derive(Debug, Default)]
pub struct MemoryTripleStore {
    triples: RwLock<BTreeSet<Triple>>,
    requests: AtomicUsize,
}

impl MemoryTripleStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triples
    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.read().len()
    }

    /// Whether the store holds no triple
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.read().is_empty()
    }

    /// Update requests applied so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Full snapshot, sorted
    #[must_use]
    pub fn triples(&self) -> Vec<Triple> {
        self.triples.read().iter().cloned().collect()
    }

    /// Triples of `subject` and its fragment sub-nodes
    #[must_use]
    pub fn describe(&self, subject: &Iri) -> Vec<Triple> {
        self.triples
            .read()
            .iter()
            .filter(|t| subject_within(t, subject))
            .cloned()
            .collect()
    }

    /// Whether `triple` is present
    #[must_use]
    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.read().contains(triple)
    }

    /// Apply an update synchronously
    pub fn apply(&self, update: &SparqlUpdate) {
        let mut triples = self.triples.write();
        for op in update.ops() {
            apply_op(&mut triples, op);
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
    }
}

fn subject_within(triple: &Triple, subject: &Iri) -> bool {
    matches!(&triple.subject, Term::Iri(s) if s.is_within(subject))
}

fn delete_node(triples: &mut BTreeSet<Triple>, node: &Iri, inbound: bool) {
    triples.retain(|t| {
        let own = subject_within(t, node);
        let points_at = inbound && matches!(&t.object, Term::Iri(o) if o == node);
        !own && !points_at
    });
}

fn apply_op(triples: &mut BTreeSet<Triple>, op: &UpdateOp) {
    match op {
        UpdateOp::InsertData(new) => triples.extend(new.iter().cloned()),
        UpdateOp::DeleteSubject { subject, inbound } => delete_node(triples, subject, *inbound),
        UpdateOp::DeleteLinked { parent, predicate } => {
            let children: Vec<Iri> = triples
                .iter()
                .filter(|t| matches!(&t.subject, Term::Iri(s) if s == parent) && &t.predicate == predicate)
                .filter_map(|t| t.object.as_iri().cloned())
                .collect();
            for child in &children {
                delete_node(triples, child, true);
            }
        }
        UpdateOp::ReplaceObjects {
            subject,
            predicate,
            objects,
        } => {
            triples.retain(|t| {
                !(matches!(&t.subject, Term::Iri(s) if s == subject) && &t.predicate == predicate)
            });
            triples.extend(
                objects
                    .iter()
                    .map(|o| Triple::new(subject.clone(), predicate.clone(), o.clone())),
            );
        }
    }
}

#[async_trait]
impl TripleStore for MemoryTripleStore {
    async fn update(&self, update: &SparqlUpdate) -> Result<(), TripleStoreError> {
        self.apply(update);
        Ok(())
    }

    async fn objects(&self, subject: &Iri, predicate: &Iri) -> Result<Vec<Term>, TripleStoreError> {
        Ok(self
            .triples
            .read()
            .iter()
            .filter(|t| matches!(&t.subject, Term::Iri(s) if s == subject) && &t.predicate == predicate)
            .map(|t| t.object.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Literal;
    use crate::vocab::{dcat, dct};

    fn iri(s: &str) -> Iri {
        Iri::new(s).unwrap()
    }

    fn seeded() -> MemoryTripleStore {
        let catalog = iri("https://ex.org/catalog");
        let ds = iri("https://ex.org/dataset/1");
        let res = iri("https://ex.org/resource/5");
        let store = MemoryTripleStore::new();
        store.apply(&SparqlUpdate::from(UpdateOp::InsertData(vec![
            Triple::new(catalog, Iri::from_static(dcat::DATASET), ds.clone()),
            Triple::new(ds.clone(), Iri::from_static(dct::TITLE), Literal::string("Air")),
            Triple::new(ds.clone(), Iri::from_static(dct::LICENSE), ds.fragment("license")),
            Triple::new(ds.fragment("license"), Iri::from_static(dct::TITLE), Literal::string("CC-BY")),
            Triple::new(ds.clone(), Iri::from_static(dcat::DISTRIBUTION), res.clone()),
            Triple::new(res, Iri::from_static(dct::TITLE), Literal::string("CSV")),
        ])));
        store
    }

    #[test]
    fn delete_subject_keeps_inbound_links_unless_asked() {
        let store = seeded();
        let ds = iri("https://ex.org/dataset/1");
        store.apply(&UpdateOp::DeleteSubject { subject: ds.clone(), inbound: false }.into());
        assert!(store.describe(&ds).is_empty());
        assert_eq!(store.len(), 2);

        store.apply(&UpdateOp::DeleteSubject { subject: ds, inbound: true }.into());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_linked_removes_children_and_links() {
        let store = seeded();
        store.apply(
            &UpdateOp::DeleteLinked {
                parent: iri("https://ex.org/dataset/1"),
                predicate: Iri::from_static(dcat::DISTRIBUTION),
            }
            .into(),
        );
        assert!(store.describe(&iri("https://ex.org/resource/5")).is_empty());
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn replace_objects_and_read_back() {
        let store = seeded();
        let catalog = iri("https://ex.org/catalog");
        let modified = Iri::from_static(dct::MODIFIED);
        for value in ["2024-01-01T00:00:00Z", "2024-06-01T00:00:00Z"] {
            store
                .update(&SparqlUpdate::from(UpdateOp::ReplaceObjects {
                    subject: catalog.clone(),
                    predicate: modified.clone(),
                    objects: vec![Literal::string(value).into()],
                }))
                .await
                .unwrap();
        }
        let values = store.objects(&catalog, &modified).await.unwrap();
        assert_eq!(values, vec![Term::from(Literal::string("2024-06-01T00:00:00Z"))]);
        assert_eq!(store.request_count(), 3);
    }
}
