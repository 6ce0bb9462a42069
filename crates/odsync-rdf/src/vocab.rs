//! Vocabulary IRIs and namespace prefixes

use crate::term::Iri;
use std::collections::BTreeMap;

/// Dublin Core terms
pub mod dct {
    /// Namespace
    pub const NS: &str = "http://purl.org/dc/terms/";
    pub const TITLE: &str = "http://purl.org/dc/terms/title";
    pub const DESCRIPTION: &str = "http://purl.org/dc/terms/description";
    pub const IDENTIFIER: &str = "http://purl.org/dc/terms/identifier";
    pub const ISSUED: &str = "http://purl.org/dc/terms/issued";
    pub const MODIFIED: &str = "http://purl.org/dc/terms/modified";
    pub const PUBLISHER: &str = "http://purl.org/dc/terms/publisher";
    pub const LICENSE: &str = "http://purl.org/dc/terms/license";
    pub const FORMAT: &str = "http://purl.org/dc/terms/format";
    pub const LICENSE_DOCUMENT: &str = "http://purl.org/dc/terms/LicenseDocument";
}

/// Data Catalog vocabulary
pub mod dcat {
    /// Namespace
    pub const NS: &str = "http://www.w3.org/ns/dcat#";
    pub const CATALOG: &str = "http://www.w3.org/ns/dcat#Catalog";
    pub const DATASET_CLASS: &str = "http://www.w3.org/ns/dcat#Dataset";
    pub const DISTRIBUTION_CLASS: &str = "http://www.w3.org/ns/dcat#Distribution";
    /// Catalog to dataset link
    pub const DATASET: &str = "http://www.w3.org/ns/dcat#dataset";
    /// Dataset to distribution link
    pub const DISTRIBUTION: &str = "http://www.w3.org/ns/dcat#distribution";
    pub const KEYWORD: &str = "http://www.w3.org/ns/dcat#keyword";
    pub const THEME: &str = "http://www.w3.org/ns/dcat#theme";
    pub const ACCESS_URL: &str = "http://www.w3.org/ns/dcat#accessURL";
    pub const LANDING_PAGE: &str = "http://www.w3.org/ns/dcat#landingPage";
    pub const CONTACT_POINT: &str = "http://www.w3.org/ns/dcat#contactPoint";
}

/// FOAF
pub mod foaf {
    /// Namespace
    pub const NS: &str = "http://xmlns.com/foaf/0.1/";
    pub const ORGANIZATION: &str = "http://xmlns.com/foaf/0.1/Organization";
    pub const NAME: &str = "http://xmlns.com/foaf/0.1/name";
    pub const HOMEPAGE: &str = "http://xmlns.com/foaf/0.1/homepage";
    pub const MBOX: &str = "http://xmlns.com/foaf/0.1/mbox";
}

/// SKOS
pub mod skos {
    /// Namespace
    pub const NS: &str = "http://www.w3.org/2004/02/skos/core#";
    pub const CONCEPT: &str = "http://www.w3.org/2004/02/skos/core#Concept";
    pub const PREF_LABEL: &str = "http://www.w3.org/2004/02/skos/core#prefLabel";
    pub const NOTATION: &str = "http://www.w3.org/2004/02/skos/core#notation";
}

/// RDF
pub mod rdf {
    /// Namespace
    pub const NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
}

/// RDFS
pub mod rdfs {
    /// Namespace
    pub const NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
    pub const LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
    pub const SEE_ALSO: &str = "http://www.w3.org/2000/01/rdf-schema#seeAlso";
}

/// XML Schema datatypes
pub mod xsd {
    /// Namespace
    pub const NS: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
}

/// vCard
pub mod vcard {
    /// Namespace
    pub const NS: &str = "http://www.w3.org/2006/vcard/ns#";
    pub const KIND: &str = "http://www.w3.org/2006/vcard/ns#Kind";
    pub const HAS_EMAIL: &str = "http://www.w3.org/2006/vcard/ns#hasEmail";
    pub const FN: &str = "http://www.w3.org/2006/vcard/ns#fn";
}

/// schema.org
pub mod schema {
    /// Namespace
    pub const NS: &str = "http://schema.org/";
    pub const URL: &str = "http://schema.org/url";
}

/// OWL
pub mod owl {
    /// Namespace
    pub const NS: &str = "http://www.w3.org/2002/07/owl#";
}

/// Prefix bindings sent with every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        let prefixes = [
            ("dct", dct::NS),
            ("dcat", dcat::NS),
            ("foaf", foaf::NS),
            ("skos", skos::NS),
            ("rdf", rdf::NS),
            ("rdfs", rdfs::NS),
            ("xsd", xsd::NS),
            ("vcard", vcard::NS),
            ("schema", schema::NS),
            ("owl", owl::NS),
        ]
        .into_iter()
        .map(|(p, ns)| (p.to_string(), ns.to_string()))
        .collect();
        Self { prefixes }
    }
}

impl Namespaces {
    /// No bindings at all
    #[must_use]
    pub fn empty() -> Self {
        Self {
            prefixes: BTreeMap::new(),
        }
    }

    /// Bind or rebind a prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), namespace.into());
        self
    }

    /// Namespace bound to `prefix`
    #[must_use]
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Number of bindings
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Whether no prefix is bound
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// `PREFIX p: <ns>` lines
    #[must_use]
    pub fn prologue(&self) -> String {
        self.prefixes
            .iter()
            .map(|(p, ns)| format!("PREFIX {p}: <{ns}>\n"))
            .collect()
    }

    /// `p:local` when a binding covers `iri` with a simple local name,
    /// `<iri>` otherwise
    #[must_use]
    pub fn compact(&self, iri: &Iri) -> String {
        self.prefixes
            .iter()
            .filter_map(|(p, ns)| {
                iri.as_str()
                    .strip_prefix(ns.as_str())
                    .filter(|local| is_simple_local(local))
                    .map(|local| (ns.len(), format!("{p}:{local}")))
            })
            .max_by_key(|(len, _)| *len)
            .map_or_else(|| iri.to_sparql(), |(_, name)| name)
    }
}

fn is_simple_local(local: &str) -> bool {
    let mut chars = local.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compacts_known_namespaces() {
        let ns = Namespaces::default();
        assert_eq!(ns.compact(&Iri::from_static(dct::TITLE)), "dct:title");
        assert_eq!(ns.compact(&Iri::from_static(dcat::ACCESS_URL)), "dcat:accessURL");
        assert_eq!(
            ns.compact(&Iri::from_static("https://example.org/dataset/1")),
            "<https://example.org/dataset/1>"
        );
    }

    #[test]
    fn complex_local_names_stay_expanded() {
        let ns = Namespaces::empty().with_prefix("ex", "https://example.org/");
        assert_eq!(
            ns.compact(&Iri::from_static("https://example.org/dataset/1")),
            "<https://example.org/dataset/1>"
        );
        assert_eq!(ns.compact(&Iri::from_static("https://example.org/catalog")), "ex:catalog");
    }

    #[test]
    fn prologue_lists_every_binding() {
        let prologue = Namespaces::default().prologue();
        assert_eq!(prologue.lines().count(), 10);
        assert!(prologue.contains("PREFIX dcat: <http://www.w3.org/ns/dcat#>"));
    }
}
