//! SPARQL 1.1 Update requests
//!
//! An [`SparqlUpdate`] is an ordered list of [`UpdateOp`]s sent as one
//! request. Endpoints apply the operations of a request in order and
//! atomically, so a delete-then-insert never leaves a half-written subject.

use crate::term::{Iri, Term, Triple};
use crate::vocab::Namespaces;

/// One graph mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOp {
    /// `INSERT DATA`
    InsertData(Vec<Triple>),

    /// Remove every triple of `subject` and of its `#fragment` sub-nodes;
    /// with `inbound`, also every triple pointing at `subject`
    DeleteSubject {
        /// Subject to clear
        subject: Iri,
        /// Also drop links into the subject
        inbound: bool,
    },

    /// Remove every node linked from `parent` through `predicate`, with
    /// their fragments and inbound links
    DeleteLinked {
        /// Parent subject
        parent: Iri,
        /// Link predicate
        predicate: Iri,
    },

    /// Replace all values of one property
    ReplaceObjects {
        /// Subject
        subject: Iri,
        /// Property
        predicate: Iri,
        /// New values; empty clears the property
        objects: Vec<Term>,
    },
}

impl UpdateOp {
    fn render(&self, ns: &Namespaces, out: &mut Vec<String>) {
        match self {
            UpdateOp::InsertData(triples) => {
                if !triples.is_empty() {
                    out.push(insert_data(ns, triples));
                }
            }
            UpdateOp::DeleteSubject { subject, inbound } => {
                let s = subject.to_sparql();
                out.push(format!(
                    "DELETE {{ ?f ?p ?o }} WHERE {{ {s} ?l ?f . FILTER(isIRI(?f) && STRSTARTS(STR(?f), \"{}#\")) ?f ?p ?o }}",
                    crate::term::escape(subject.as_str())
                ));
                out.push(format!("DELETE WHERE {{ {s} ?p ?o }}"));
                if *inbound {
                    out.push(format!("DELETE WHERE {{ ?x ?q {s} }}"));
                }
            }
            UpdateOp::DeleteLinked { parent, predicate } => {
                let link = format!("{} {} ?c", parent.to_sparql(), ns.compact(predicate));
                out.push(format!(
                    "DELETE {{ ?f ?p ?o }} WHERE {{ {link} . ?c ?l ?f . FILTER(isIRI(?f) && STRSTARTS(STR(?f), CONCAT(STR(?c), \"#\"))) ?f ?p ?o }}"
                ));
                out.push(format!("DELETE {{ ?c ?p ?o }} WHERE {{ {link} . ?c ?p ?o }}"));
                out.push(format!("DELETE {{ ?x ?q ?c }} WHERE {{ {link} . ?x ?q ?c }}"));
            }
            UpdateOp::ReplaceObjects {
                subject,
                predicate,
                objects,
            } => {
                out.push(format!(
                    "DELETE WHERE {{ {} {} ?o }}",
                    subject.to_sparql(),
                    ns.compact(predicate)
                ));
                let triples: Vec<Triple> = objects
                    .iter()
                    .map(|o| Triple::new(subject.clone(), predicate.clone(), o.clone()))
                    .collect();
                if !triples.is_empty() {
                    out.push(insert_data(ns, &triples));
                }
            }
        }
    }
}

fn render_term(ns: &Namespaces, term: &Term) -> String {
    match term {
        Term::Iri(iri) => ns.compact(iri),
        other => other.to_sparql(),
    }
}

fn insert_data(ns: &Namespaces, triples: &[Triple]) -> String {
    let body: String = triples
        .iter()
        .map(|t| {
            format!(
                "  {} {} {} .\n",
                render_term(ns, &t.subject),
                ns.compact(&t.predicate),
                render_term(ns, &t.object)
            )
        })
        .collect();
    format!("INSERT DATA {{\n{body}}}")
}

/// Ordered, atomic update request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparqlUpdate {
    ops: Vec<UpdateOp>,
}

impl SparqlUpdate {
    /// Empty request
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation (builder form)
    #[must_use]
    pub fn then(mut self, op: UpdateOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Append an operation
    pub fn push(&mut self, op: UpdateOp) {
        self.ops.push(op);
    }

    /// Append every operation of `other`
    pub fn append(&mut self, other: SparqlUpdate) {
        self.ops.extend(other.ops);
    }

    /// Operations in execution order
    #[inline]
    #[must_use]
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Whether the request would change nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.iter().all(|op| match op {
            UpdateOp::InsertData(triples) => triples.is_empty(),
            _ => false,
        })
    }

    /// Request body: prefix prologue followed by `;`-separated operations
    #[must_use]
    pub fn render(&self, ns: &Namespaces) -> String {
        let mut parts = Vec::new();
        for op in &self.ops {
            op.render(ns, &mut parts);
        }
        format!("{}{}", ns.prologue(), parts.join(" ;\n"))
    }
}

impl From<UpdateOp> for SparqlUpdate {
    fn from(op: UpdateOp) -> Self {
        Self { ops: vec![op] }
    }
}

/// `SELECT ?o WHERE { <subject> <predicate> ?o }`
#[must_use]
pub fn select_objects(ns: &Namespaces, subject: &Iri, predicate: &Iri) -> String {
    format!(
        "{}SELECT ?o WHERE {{ {} {} ?o }}",
        ns.prologue(),
        subject.to_sparql(),
        ns.compact(predicate)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Literal;
    use crate::vocab::{dcat, dct};
    use pretty_assertions::assert_eq;

    fn subject() -> Iri {
        Iri::from_static("https://data.example.org/dataset/7")
    }

    #[test]
    fn delete_then_insert_renders_in_order() {
        let update = SparqlUpdate::new()
            .then(UpdateOp::DeleteSubject {
                subject: subject(),
                inbound: false,
            })
            .then(UpdateOp::InsertData(vec![Triple::new(
                subject(),
                Iri::from_static(dct::TITLE),
                Literal::string("Air quality"),
            )]));
        let body = update.render(&Namespaces::empty());
        assert_eq!(
            body,
            "DELETE { ?f ?p ?o } WHERE { <https://data.example.org/dataset/7> ?l ?f . FILTER(isIRI(?f) && STRSTARTS(STR(?f), \"https://data.example.org/dataset/7#\")) ?f ?p ?o } ;\n\
             DELETE WHERE { <https://data.example.org/dataset/7> ?p ?o } ;\n\
             INSERT DATA {\n  <https://data.example.org/dataset/7> <http://purl.org/dc/terms/title> \"Air quality\" .\n}"
        );
    }

    #[test]
    fn inbound_delete_adds_reverse_pattern() {
        let body = SparqlUpdate::from(UpdateOp::DeleteSubject {
            subject: subject(),
            inbound: true,
        })
        .render(&Namespaces::empty());
        assert!(body.ends_with("DELETE WHERE { ?x ?q <https://data.example.org/dataset/7> }"));
    }

    #[test]
    fn delete_linked_clears_children_before_links() {
        let body = SparqlUpdate::from(UpdateOp::DeleteLinked {
            parent: subject(),
            predicate: Iri::from_static(dcat::DISTRIBUTION),
        })
        .render(&Namespaces::default());
        let parts: Vec<&str> = body.split(" ;\n").collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].contains("DELETE { ?c ?p ?o }"));
        assert!(parts[2].contains("DELETE { ?x ?q ?c }"));
        assert!(parts[2].contains("dcat:distribution ?c"));
        assert!(body.starts_with("PREFIX dcat:"));
    }

    #[test]
    fn replace_with_no_objects_only_deletes() {
        let update = SparqlUpdate::from(UpdateOp::ReplaceObjects {
            subject: Iri::from_static("https://data.example.org/catalog"),
            predicate: Iri::from_static(dct::MODIFIED),
            objects: Vec::new(),
        });
        assert_eq!(
            update.render(&Namespaces::default()).lines().last(),
            Some("DELETE WHERE { <https://data.example.org/catalog> dct:modified ?o }")
        );
    }

    #[test]
    fn empty_insert_is_empty_update() {
        assert!(SparqlUpdate::new().is_empty());
        assert!(SparqlUpdate::from(UpdateOp::InsertData(Vec::new())).is_empty());
        assert!(!SparqlUpdate::from(UpdateOp::DeleteSubject {
            subject: subject(),
            inbound: false
        })
        .is_empty());
    }
}
