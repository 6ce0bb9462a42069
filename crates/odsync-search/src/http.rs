//! Elasticsearch-compatible index client
//!
//! - documents: `PUT/DELETE {url}/{index}/_doc/{id}`
//! - bulk: `POST {url}/_bulk` with an NDJSON body
//! - multi-get: `POST {url}/{index}/_mget`
//! - paging: `POST {url}/{index}/_search` sorted by `id` with `search_after`
//!
//! Index names are `{index_prefix}{segment}`, e.g. `odsync-dataset`.

use crate::document::{BulkOp, SearchDocument};
use crate::error::SearchError;
use crate::index::SearchIndex;
use async_trait::async_trait;
use odsync_model::{EntityId, EntityKind, EntityRef};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Index endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchIndexConfig {
    /// Base URL
    pub url: String,
    /// Prefix of every index name
    pub index_prefix: String,
    /// Basic auth user
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index_prefix: "odsync-".to_string(),
            username: None,
            password: None,
            timeout_ms: 10_000,
        }
    }
}

/// Document index reached over HTTP
#[derive(Clone)]
pub struct HttpSearchIndex {
    client: Client,
    config: SearchIndexConfig,
}

impl std::fmt::Debug for HttpSearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSearchIndex")
            .field("url", &self.config.url)
            .field("index_prefix", &self.config.index_prefix)
            .field("has_auth", &self.config.username.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpSearchIndex {
    /// Build client
    ///
    /// # Errors
    /// `SearchError::Config` when the HTTP client cannot be built.
    pub fn new(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SearchError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Index holding documents of `kind`
    #[must_use]
    pub fn index_name(&self, kind: EntityKind) -> String {
        format!("{}{}", self.config.index_prefix, kind.segment())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.url.trim_end_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(path));
        match self.config.username {
            Some(ref user) => req.basic_auth(user, self.config.password.as_ref()),
            None => req,
        }
    }

    /// Send, returning status and body; transport failures are classified
    async fn send(&self, req: RequestBuilder) -> Result<(StatusCode, String), SearchError> {
        let resp = req.send().await.map_err(|e| SearchError::from_reqwest(&e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| SearchError::from_reqwest(&e))?;
        Ok((status, text))
    }

    fn check(status: StatusCode, body: String) -> Result<String, SearchError> {
        if status.is_success() {
            Ok(body)
        } else {
            Err(SearchError::from_status(status.as_u16(), body))
        }
    }

    fn document(kind: EntityKind, id: &str, source: Value) -> Result<SearchDocument, SearchError> {
        let id: u64 = id
            .parse()
            .map_err(|_| SearchError::InvalidResponse(format!("non-numeric document id '{id}'")))?;
        match source {
            Value::Object(body) => Ok(SearchDocument::new(kind, EntityId(id), body)),
            _ => Err(SearchError::InvalidResponse(format!("document {id} has no _source object"))),
        }
    }
}

/// NDJSON body of a bulk request
fn bulk_body(index_name: impl Fn(EntityKind) -> String, ops: &[BulkOp]) -> String {
    let mut body = String::new();
    for op in ops {
        match op {
            BulkOp::Index(doc) => {
                let action = json!({"index": {"_index": index_name(doc.kind), "_id": doc.id.to_string()}});
                body.push_str(&action.to_string());
                body.push('\n');
                body.push_str(&Value::Object(doc.body.clone()).to_string());
                body.push('\n');
            }
            BulkOp::Delete(entity) => {
                let action = json!({"delete": {"_index": index_name(entity.kind), "_id": entity.id.to_string()}});
                body.push_str(&action.to_string());
                body.push('\n');
            }
        }
    }
    body
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

/// First failed item and failure count; a delete of a missing document is
/// not a failure
fn bulk_failures(resp: &BulkResponse) -> Option<SearchError> {
    if !resp.errors {
        return None;
    }
    let failed: Vec<(u16, String)> = resp
        .items
        .iter()
        .flat_map(|item| item.iter())
        .filter_map(|(action, result)| {
            let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
            let status = u16::try_from(status).unwrap_or(u16::MAX);
            let missing_delete = action == "delete" && status == 404;
            if (200..300).contains(&status) || missing_delete {
                None
            } else {
                let reason = result
                    .get("error")
                    .map(|e| {
                        e.get("type")
                            .and_then(Value::as_str)
                            .map_or_else(|| e.to_string(), str::to_string)
                    })
                    .unwrap_or_default();
                Some((status, reason))
            }
        })
        .collect();
    let (status, reason) = failed.first().cloned()?;
    Some(SearchError::BulkItems {
        failed: failed.len(),
        status,
        reason,
    })
}

#[derive(Deserialize)]
struct MgetResponse {
    docs: Vec<MgetDoc>,
}

#[derive(Deserialize)]
struct MgetDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

fn decode<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, SearchError> {
    serde_json::from_str(body).map_err(|e| SearchError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn upsert(&self, doc: &SearchDocument) -> Result<(), SearchError> {
        let path = format!("{}/_doc/{}", self.index_name(doc.kind), doc.id);
        let (status, body) = self
            .send(self.request(Method::PUT, &path).json(&doc.body))
            .await?;
        Self::check(status, body).map(|_| ())
    }

    async fn delete(&self, entity: EntityRef) -> Result<bool, SearchError> {
        let path = format!("{}/_doc/{}", self.index_name(entity.kind), entity.id);
        let (status, body) = self.send(self.request(Method::DELETE, &path)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(status, body).map(|_| true)
    }

    async fn bulk(&self, ops: &[BulkOp]) -> Result<(), SearchError> {
        if ops.is_empty() {
            return Ok(());
        }
        let payload = bulk_body(|kind| self.index_name(kind), ops);
        tracing::debug!(items = ops.len(), bytes = payload.len(), "sending bulk request");
        let (status, body) = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header(CONTENT_TYPE, "application/x-ndjson")
                    .body(payload),
            )
            .await?;
        let body = Self::check(status, body)?;
        match bulk_failures(&decode::<BulkResponse>(&body)?) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn get_many(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<SearchDocument>, SearchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("{}/_mget", self.index_name(kind));
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let (status, body) = self
            .send(self.request(Method::POST, &path).json(&json!({"ids": ids})))
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = Self::check(status, body)?;
        decode::<MgetResponse>(&body)?
            .docs
            .into_iter()
            .filter(|d| d.found)
            .map(|d| Self::document(kind, &d.id, d.source))
            .collect()
    }

    async fn scan(
        &self,
        kind: EntityKind,
        after: Option<EntityId>,
        limit: usize,
    ) -> Result<Vec<SearchDocument>, SearchError> {
        let path = format!("{}/_search", self.index_name(kind));
        let mut query = json!({
            "size": limit,
            "sort": [{"id": "asc"}],
            "query": {"match_all": {}},
        });
        if let (Some(after), Some(map)) = (after, query.as_object_mut()) {
            map.insert("search_after".into(), json!([after]));
        }
        let (status, body) = self
            .send(self.request(Method::POST, &path).json(&query))
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = Self::check(status, body)?;
        decode::<SearchResponse>(&body)?
            .hits
            .hits
            .into_iter()
            .map(|h| Self::document(kind, &h.id, h.source))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index() -> HttpSearchIndex {
        HttpSearchIndex::new(SearchIndexConfig {
            url: "http://127.0.0.1:1/".to_string(),
            timeout_ms: 2_000,
            ..SearchIndexConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn bulk_body_is_ndjson() {
        let mut body = Map::new();
        body.insert("title".into(), json!("Air"));
        let ops = [
            BulkOp::Index(SearchDocument::new(EntityKind::Dataset, EntityId(7), body)),
            BulkOp::Delete(EntityRef::new(EntityKind::Resource, 3)),
        ];
        let index = index();
        let ndjson = bulk_body(|k| index.index_name(k), &ops);
        let lines: Vec<Value> = ndjson
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(
            lines,
            vec![
                json!({"index": {"_index": "odsync-dataset", "_id": "7"}}),
                json!({"title": "Air"}),
                json!({"delete": {"_index": "odsync-resource", "_id": "3"}}),
            ]
        );
        assert!(ndjson.ends_with('\n'));
    }

    #[test]
    fn bulk_failures_skip_missing_deletes() {
        let resp: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"delete": {"_id": "2", "status": 404}},
                {"index": {"_id": "3", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
            ]
        }))
        .unwrap();
        assert_eq!(
            bulk_failures(&resp),
            Some(SearchError::BulkItems {
                failed: 1,
                status: 400,
                reason: "mapper_parsing_exception".into()
            })
        );
    }

    #[test]
    fn decodes_search_hits() {
        let resp: SearchResponse = decode(
            r#"{"hits": {"hits": [{"_id": "4", "_source": {"id": 4, "title": "Air"}}]}}"#,
        )
        .unwrap();
        let hit = resp.hits.hits.into_iter().next().unwrap();
        let doc = HttpSearchIndex::document(EntityKind::Dataset, &hit.id, hit.source).unwrap();
        assert_eq!(doc.id, EntityId(4));
        assert_eq!(doc.get("title"), Some(&json!("Air")));
        assert!(HttpSearchIndex::document(EntityKind::Dataset, "abc", json!({})).is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let err = index()
            .delete(EntityRef::new(EntityKind::Dataset, 1))
            .await
            .unwrap_err();
        assert!(err.is_connection_refused(), "{err:?}");
    }
}
