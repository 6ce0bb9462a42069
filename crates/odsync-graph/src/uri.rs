//! Deterministic subject URIs
//!
//! `{base}/{segment}/{id}` for entities, `{base}/catalog` for the catalog.
//! The subject depends on kind and id only, so a delete can be issued after
//! the row is gone.

use odsync_model::{EntityId, EntityKind, EntityRef};
use odsync_rdf::{Iri, TermError};

/// URI minting rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriScheme {
    base: Iri,
}

impl UriScheme {
    /// Scheme rooted at `base` (trailing slashes ignored)
    ///
    /// # Errors
    /// `TermError::InvalidIri` when `base` is not an absolute IRI.
    pub fn new(base: &str) -> Result<Self, TermError> {
        Ok(Self {
            base: Iri::new(base.trim_end_matches('/'))?,
        })
    }

    /// Base URI
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Iri {
        &self.base
    }

    /// Subject of an entity
    #[must_use]
    pub fn subject(&self, entity: EntityRef) -> Iri {
        self.base.join(entity.kind.segment()).join(entity.id)
    }

    /// Catalog subject
    #[must_use]
    pub fn catalog(&self) -> Iri {
        self.base.join("catalog")
    }

    /// Entity addressed by `subject`, if it was minted by this scheme
    #[must_use]
    pub fn parse(&self, subject: &Iri) -> Option<EntityRef> {
        let rest = subject
            .as_str()
            .strip_prefix(self.base.as_str())?
            .strip_prefix('/')?;
        let (segment, id) = rest.split_once('/')?;
        let kind = EntityKind::ALL.into_iter().find(|k| k.segment() == segment)?;
        let id: u64 = id.parse().ok()?;
        Some(EntityRef::new(kind, EntityId(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_are_derived_from_kind_and_id() {
        let scheme = UriScheme::new("https://data.example.org/").unwrap();
        let resource = EntityRef::new(EntityKind::Resource, 42);
        let subject = scheme.subject(resource);
        assert_eq!(subject.as_str(), "https://data.example.org/resource/42");
        assert_eq!(scheme.parse(&subject), Some(resource));
        assert_eq!(scheme.catalog().as_str(), "https://data.example.org/catalog");
        assert_eq!(scheme.parse(&scheme.catalog()), None);
        assert_eq!(scheme.parse(&subject.fragment("license")), None);
    }

    #[test]
    fn relative_base_is_rejected() {
        assert!(UriScheme::new("data.example.org").is_err());
    }
}
