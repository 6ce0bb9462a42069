//! SPARQL protocol client
//!
//! Updates are POSTed as `application/sparql-update`; lookups are SELECT
//! queries answered as `application/sparql-results+json`.

use crate::error::TripleStoreError;
use crate::store::TripleStore;
use crate::term::{Iri, Literal, Term};
use crate::update::{select_objects, SparqlUpdate};
use crate::vocab::Namespaces;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripleStoreConfig {
    /// SPARQL Update endpoint
    pub update_url: String,
    /// SPARQL Query endpoint
    pub query_url: String,
    /// Basic auth user
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for TripleStoreConfig {
    fn default() -> Self {
        Self {
            update_url: "http://localhost:3030/odsync/update".to_string(),
            query_url: "http://localhost:3030/odsync/query".to_string(),
            username: None,
            password: None,
            timeout_ms: 10_000,
        }
    }
}

/// Triple store reached over HTTP
#[derive(Clone)]
pub struct HttpTripleStore {
    client: Client,
    config: TripleStoreConfig,
    namespaces: Namespaces,
}

impl std::fmt::Debug for HttpTripleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTripleStore")
            .field("update_url", &self.config.update_url)
            .field("query_url", &self.config.query_url)
            .field("has_auth", &self.config.username.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpTripleStore {
    /// Build client
    ///
    /// # Errors
    /// `TripleStoreError::Config` when the HTTP client cannot be built.
    pub fn new(config: TripleStoreConfig, namespaces: Namespaces) -> Result<Self, TripleStoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| TripleStoreError::Config(e.to_string()))?;
        Ok(Self {
            client,
            config,
            namespaces,
        })
    }

    /// Prefix bindings sent with each request
    #[inline]
    #[must_use]
    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    async fn post(&self, url: &str, content_type: &str, body: String) -> Result<String, TripleStoreError> {
        let mut req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, "application/sparql-results+json")
            .body(body);
        if let Some(ref user) = self.config.username {
            req = req.basic_auth(user, self.config.password.as_ref());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TripleStoreError::from_reqwest(&e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| TripleStoreError::from_reqwest(&e))?;
        if !status.is_success() {
            return Err(TripleStoreError::from_status(status.as_u16(), text));
        }
        Ok(text)
    }
}

#[async_trait]
impl TripleStore for HttpTripleStore {
    async fn update(&self, update: &SparqlUpdate) -> Result<(), TripleStoreError> {
        if update.is_empty() {
            return Ok(());
        }
        let body = update.render(&self.namespaces);
        tracing::debug!(
            endpoint = %self.config.update_url,
            operations = update.ops().len(),
            bytes = body.len(),
            "sending SPARQL update"
        );
        self.post(&self.config.update_url, "application/sparql-update", body)
            .await
            .map(|_| ())
    }

    async fn objects(&self, subject: &Iri, predicate: &Iri) -> Result<Vec<Term>, TripleStoreError> {
        let query = select_objects(&self.namespaces, subject, predicate);
        let body = self
            .post(&self.config.query_url, "application/sparql-query", query)
            .await?;
        parse_objects(&body)
    }
}

#[derive(Deserialize)]
struct SelectResults {
    results: Bindings,
}

#[derive(Deserialize)]
struct Bindings {
    bindings: Vec<HashMap<String, BindingValue>>,
}

#[derive(Deserialize)]
struct BindingValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
}

impl BindingValue {
    fn into_term(self) -> Result<Term, TripleStoreError> {
        match self.kind.as_str() {
            "uri" => Iri::new(self.value)
                .map(Term::Iri)
                .map_err(|e| TripleStoreError::InvalidResponse(e.to_string())),
            "bnode" => Ok(Term::Blank(self.value)),
            "literal" | "typed-literal" => Ok(Term::Literal(match (self.datatype, self.lang) {
                (_, Some(lang)) => Literal::lang(self.value, lang),
                (Some(dt), None) => Literal::typed(
                    self.value,
                    Iri::new(dt).map_err(|e| TripleStoreError::InvalidResponse(e.to_string()))?,
                ),
                (None, None) => Literal::string(self.value),
            })),
            other => Err(TripleStoreError::InvalidResponse(format!(
                "unknown binding type '{other}'"
            ))),
        }
    }
}

/// Decode the `?o` column of a SPARQL JSON result set
fn parse_objects(body: &str) -> Result<Vec<Term>, TripleStoreError> {
    let results: SelectResults = serde_json::from_str(body)
        .map_err(|e| TripleStoreError::InvalidResponse(e.to_string()))?;
    results
        .results
        .bindings
        .into_iter()
        .filter_map(|mut row| row.remove("o"))
        .map(BindingValue::into_term)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::xsd;

    #[test]
    fn parses_select_results() {
        let body = r#"{
            "head": {"vars": ["o"]},
            "results": {"bindings": [
                {"o": {"type": "literal", "value": "2024-06-01T00:00:00Z", "datatype": "http://www.w3.org/2001/XMLSchema#dateTime"}},
                {"o": {"type": "uri", "value": "https://ex.org/dataset/1"}},
                {"o": {"type": "literal", "value": "Zbiory", "xml:lang": "pl"}},
                {"o": {"type": "bnode", "value": "b0"}}
            ]}
        }"#;
        let terms = parse_objects(body).unwrap();
        assert_eq!(terms.len(), 4);
        assert_eq!(
            terms[0],
            Term::Literal(Literal::typed("2024-06-01T00:00:00Z", Iri::from_static(xsd::DATE_TIME)))
        );
        assert_eq!(terms[1].as_iri().map(Iri::as_str), Some("https://ex.org/dataset/1"));
        assert_eq!(terms[2].as_literal().and_then(Literal::language), Some("pl"));
        assert_eq!(terms[3], Term::Blank("b0".to_string()));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_objects("<html>"),
            Err(TripleStoreError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let config = TripleStoreConfig {
            update_url: "http://127.0.0.1:1/update".to_string(),
            query_url: "http://127.0.0.1:1/query".to_string(),
            timeout_ms: 2_000,
            ..TripleStoreConfig::default()
        };
        let store = HttpTripleStore::new(config, Namespaces::default()).unwrap();
        let err = store
            .update(&SparqlUpdate::from(crate::update::UpdateOp::DeleteSubject {
                subject: Iri::from_static("https://ex.org/dataset/1"),
                inbound: false,
            }))
            .await
            .unwrap_err();
        assert!(err.is_connection_refused(), "{err:?}");
    }
}
