//! RDF terms and triples
//!
//! Terms render to SPARQL/N-Triples syntax through [`Term::to_sparql`];
//! IRIs may additionally be compacted with [`crate::Namespaces`].

use crate::error::TermError;
use crate::vocab::xsd;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Absolute IRI
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Iri(String);

impl Iri {
    /// Parse and validate an absolute IRI
    ///
    /// # Errors
    /// `TermError::InvalidIri` when the value has no scheme or contains
    /// characters not allowed inside `<...>`.
    pub fn new(value: impl Into<String>) -> Result<Self, TermError> {
        let value = value.into();
        let scheme_ok = value
            .split_once(':')
            .is_some_and(|(scheme, rest)| {
                !rest.is_empty()
                    && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            });
        if !scheme_ok {
            return Err(TermError::InvalidIri {
                iri: value,
                reason: "missing scheme",
            });
        }
        if value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\'))
        {
            return Err(TermError::InvalidIri {
                iri: value,
                reason: "forbidden character",
            });
        }
        Ok(Self(value))
    }

    /// Vocabulary constant, not validated
    #[inline]
    #[must_use]
    pub fn from_static(value: &'static str) -> Self {
        Self(value.to_string())
    }

    /// IRI text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sub-node `{self}#{field}`
    #[must_use]
    pub fn fragment(&self, field: &str) -> Self {
        Self(format!("{}#{field}", self.0))
    }

    /// Child path `{self}/{segment}`; `segment` must already be IRI-safe
    #[must_use]
    pub fn join(&self, segment: impl fmt::Display) -> Self {
        Self(format!("{}/{segment}", self.0.trim_end_matches('/')))
    }

    /// Whether `self` is `other` or one of its `#fragment` sub-nodes
    #[must_use]
    pub fn is_within(&self, other: &Iri) -> bool {
        self.0 == other.0
            || self
                .0
                .strip_prefix(other.0.as_str())
                .is_some_and(|rest| rest.starts_with('#'))
    }

    /// `<iri>`
    #[must_use]
    pub fn to_sparql(&self) -> String {
        format!("<{}>", self.0)
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Iri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Literal value with optional datatype or language tag
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    lexical: String,
    datatype: Option<Iri>,
    language: Option<String>,
}

impl Literal {
    /// Plain string
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            lexical: value.into(),
            datatype: None,
            language: None,
        }
    }

    /// Language-tagged string
    #[must_use]
    pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// Typed literal
    #[must_use]
    pub fn typed(value: impl Into<String>, datatype: Iri) -> Self {
        Self {
            lexical: value.into(),
            datatype: Some(datatype),
            language: None,
        }
    }

    /// `xsd:dateTime`, second precision, UTC
    #[must_use]
    pub fn date_time(value: DateTime<Utc>) -> Self {
        Self::typed(
            value.to_rfc3339_opts(SecondsFormat::Secs, true),
            Iri::from_static(xsd::DATE_TIME),
        )
    }

    /// `xsd:integer`
    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self::typed(value.to_string(), Iri::from_static(xsd::INTEGER))
    }

    /// `xsd:boolean`
    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::typed(value.to_string(), Iri::from_static(xsd::BOOLEAN))
    }

    /// Lexical form
    #[inline]
    #[must_use]
    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// Datatype, if typed
    #[inline]
    #[must_use]
    pub fn datatype(&self) -> Option<&Iri> {
        self.datatype.as_ref()
    }

    /// Language tag, if any
    #[inline]
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Parse the lexical form as a timestamp
    #[must_use]
    pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.lexical)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// SPARQL literal syntax
    #[must_use]
    pub fn to_sparql(&self) -> String {
        let quoted = format!("\"{}\"", escape(&self.lexical));
        match (&self.datatype, &self.language) {
            (_, Some(lang)) => format!("{quoted}@{lang}"),
            (Some(dt), None) => format!("{quoted}^^{}", dt.to_sparql()),
            (None, None) => quoted,
        }
    }
}

/// Escape a string for a double-quoted SPARQL literal
#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c => out.push(c),
        }
    }
    out
}

/// Subject or object position term
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    /// Named node
    Iri(Iri),
    /// Blank node label
    Blank(String),
    /// Literal
    Literal(Literal),
}

impl Term {
    /// SPARQL syntax
    #[must_use]
    pub fn to_sparql(&self) -> String {
        match self {
            Term::Iri(iri) => iri.to_sparql(),
            Term::Blank(label) => format!("_:{label}"),
            Term::Literal(lit) => lit.to_sparql(),
        }
    }

    /// Named node, if this is one
    #[must_use]
    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// Literal, if this is one
    #[must_use]
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

impl From<Iri> for Term {
    fn from(iri: Iri) -> Self {
        Term::Iri(iri)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Literal(lit)
    }
}

/// One RDF statement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Triple {
    /// Subject (named or blank)
    pub subject: Term,
    /// Predicate
    pub predicate: Iri,
    /// Object
    pub object: Term,
}

impl Triple {
    /// Create triple
    #[must_use]
    pub fn new(subject: Iri, predicate: Iri, object: impl Into<Term>) -> Self {
        Self {
            subject: Term::Iri(subject),
            predicate,
            object: object.into(),
        }
    }

    /// N-Triples line without the trailing newline
    #[must_use]
    pub fn to_ntriple(&self) -> String {
        format!(
            "{} {} {} .",
            self.subject.to_sparql(),
            self.predicate.to_sparql(),
            self.object.to_sparql()
        )
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ntriple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn unescape(value: &str) -> String {
        let mut out = String::new();
        let mut chars = value.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('b') => out.push('\u{8}'),
                Some('f') => out.push('\u{c}'),
                Some(other) => out.push(other),
                None => {}
            }
        }
        out
    }

    #[test]
    fn iri_validation() {
        assert!(Iri::new("https://data.example.org/dataset/1").is_ok());
        assert!(Iri::new("urn:uuid:1234").is_ok());
        assert!(Iri::new("dataset/1").is_err());
        assert!(Iri::new("https://example.org/a b").is_err());
        assert!(Iri::new("https://example.org/<x>").is_err());
        assert!(Iri::new("1http://example.org").is_err());
    }

    #[test]
    fn fragments_stay_within_subject() {
        let subject = Iri::from_static("https://example.org/dataset/7");
        let license = subject.fragment("license");
        assert_eq!(license.as_str(), "https://example.org/dataset/7#license");
        assert!(license.is_within(&subject));
        assert!(subject.is_within(&subject));
        assert!(!Iri::from_static("https://example.org/dataset/70").is_within(&subject));
    }

    #[test]
    fn join_appends_path_segment() {
        let base = Iri::from_static("https://example.org/");
        assert_eq!(base.join("dataset").join(7).as_str(), "https://example.org/dataset/7");
    }

    #[test]
    fn literal_rendering() {
        assert_eq!(Literal::string("a \"b\"").to_sparql(), r#""a \"b\"""#);
        assert_eq!(Literal::lang("Zbiory", "pl").to_sparql(), r#""Zbiory"@pl"#);
        assert_eq!(
            Literal::integer(3).to_sparql(),
            r#""3"^^<http://www.w3.org/2001/XMLSchema#integer>"#
        );
    }

    #[test]
    fn date_time_literal_roundtrip() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let lit = Literal::date_time(at);
        assert_eq!(lit.lexical(), "2024-06-01T12:00:00Z");
        assert_eq!(lit.as_date_time(), Some(at));
    }

    #[test]
    fn triple_ntriple() {
        let t = Triple::new(
            Iri::from_static("https://example.org/license/1"),
            Iri::from_static("http://purl.org/dc/terms/title"),
            Literal::string("CC-BY"),
        );
        assert_eq!(
            t.to_string(),
            r#"<https://example.org/license/1> <http://purl.org/dc/terms/title> "CC-BY" ."#
        );
    }

    proptest! {
        #[test]
        fn escaped_literals_never_break_quoting(value in ".*") {
            let escaped = escape(&value);
            prop_assert!(!escaped.contains('\n'));
            prop_assert!(!escaped.contains('\r'));
            let unescaped_quotes = escaped
                .match_indices('"')
                .filter(|(i, _)| {
                    let backslashes = escaped[..*i].chars().rev().take_while(|c| *c == '\\').count();
                    backslashes % 2 == 0
                })
                .count();
            prop_assert_eq!(unescaped_quotes, 0);
            prop_assert_eq!(unescape(&escaped), value);
        }
    }
}
