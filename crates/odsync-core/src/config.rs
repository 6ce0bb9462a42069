//! Pipeline configuration
//!
//! Loaded from TOML; every field has a default, so an empty file is a valid
//! configuration. A handful of environment variables override the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `ODSYNC_TRIPLE_STORE_URL` | `triple_store.update_url` and `triple_store.query_url` |
//! | `ODSYNC_SEARCH_URL` | `search.index.url` |
//! | `ODSYNC_WORKERS` | `queue.workers` |
//! | `ODSYNC_LOG_LEVEL` | `logging.level` |
//! | `ODSYNC_BASE_URI` | `rdf.base_uri` |
//!
//! `ODSYNC_TRIPLE_STORE_URL` is the dataset endpoint; `/update` and
//! `/query` are appended.

use crate::error::ConfigError;
use odsync_graph::{UriScheme, DEFAULT_CASCADE_CHUNK_SIZE, DEFAULT_CATALOG_TITLE};
use odsync_queue::{Backoff, QueueConfig, RetryPolicy, RetryPredicate};
use odsync_rdf::{Namespaces, TripleStoreConfig};
use odsync_search::{SearchIndexConfig, DEFAULT_BATCH_SIZE, DEFAULT_BULK_CHUNK_SIZE, DEFAULT_BULK_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// RDF projection
    pub rdf: RdfConfig,
    /// SPARQL endpoint
    pub triple_store: TripleStoreConfig,
    /// Document index
    pub search: SearchConfig,
    /// Task queue
    pub queue: QueueSettings,
    /// Consistency checker
    pub consistency: ConsistencyConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// RDF projection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdfConfig {
    /// Absolute base of every subject URI
    pub base_uri: String,
    /// Title of the catalog resource
    pub catalog_title: String,
    /// Dependents rewritten per SPARQL request
    pub cascade_chunk_size: usize,
    /// Prefixes bound in addition to the built-in ones
    pub prefixes: BTreeMap<String, String>,
}

impl Default for RdfConfig {
    fn default() -> Self {
        Self {
            base_uri: "https://data.example.org".to_string(),
            catalog_title: DEFAULT_CATALOG_TITLE.to_string(),
            cascade_chunk_size: DEFAULT_CASCADE_CHUNK_SIZE,
            prefixes: BTreeMap::new(),
        }
    }
}

impl RdfConfig {
    /// Built-in prefixes plus the configured ones
    #[must_use]
    pub fn namespaces(&self) -> Namespaces {
        self.prefixes
            .iter()
            .fold(Namespaces::default(), |ns, (prefix, iri)| {
                ns.with_prefix(prefix.clone(), iri.clone())
            })
    }
}

/// Document index settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fan-out size from which bulk requests are used
    pub bulk_threshold: usize,
    /// Items per bulk request
    pub bulk_chunk_size: usize,
    /// Endpoint
    pub index: SearchIndexConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bulk_threshold: DEFAULT_BULK_THRESHOLD,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
            index: SearchIndexConfig::default(),
        }
    }
}

/// Task queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Queue name in logs and metrics
    pub name: String,
    /// Concurrent workers
    pub workers: usize,
    /// Retries of graph tasks refused by the triple store
    pub graph_max_retries: u32,
    /// Retries of search tasks after transient index failures
    pub search_max_retries: u32,
    /// Delay between attempts
    pub backoff: Backoff,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "odsync".to_string(),
            workers: 4,
            graph_max_retries: 5,
            search_max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl QueueSettings {
    /// Worker pool configuration
    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.name.clone(), self.workers)
    }

    /// Policy of mutating graph operations: retry on connection refusal
    #[must_use]
    pub fn graph_policy(&self) -> RetryPolicy {
        RetryPolicy::connection_refused()
            .with_max_retries(self.graph_max_retries)
            .with_backoff(self.backoff)
    }

    /// Policy of search operations: retry on any transient failure
    #[must_use]
    pub fn search_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.search_max_retries,
            self.backoff,
            RetryPredicate::transient(),
        )
    }
}

/// Consistency checker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Ids per page
    pub batch_size: usize,
    /// Directory of checkpoint files; in memory when unset
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_dir: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// One JSON object per line instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    ///
    /// # Errors
    /// `ConfigError::Parse` for invalid TOML or mistyped values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// File (or defaults when `path` is `None`), then environment
    /// overrides, then validation
    ///
    /// # Errors
    /// Any read, parse, override or validation failure.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `ConfigError::Render` when a value cannot be represented.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// `ConfigError::Env` for an unparseable value.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides looked up through `lookup`
    ///
    /// # Errors
    /// `ConfigError::Env` for an unparseable value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ODSYNC_TRIPLE_STORE_URL") {
            let base = url.trim_end_matches('/');
            self.triple_store.update_url = format!("{base}/update");
            self.triple_store.query_url = format!("{base}/query");
        }
        if let Some(url) = lookup("ODSYNC_SEARCH_URL") {
            self.search.index.url = url;
        }
        if let Some(raw) = lookup("ODSYNC_WORKERS") {
            self.queue.workers = raw.trim().parse().map_err(|_| ConfigError::Env {
                var: "ODSYNC_WORKERS",
                value: raw.clone(),
            })?;
        }
        if let Some(level) = lookup("ODSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(base) = lookup("ODSYNC_BASE_URI") {
            self.rdf.base_uri = base;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.workers == 0 {
            return Err(ConfigError::Invalid("queue.workers must be at least 1".into()));
        }
        UriScheme::new(&self.rdf.base_uri).map_err(|e| {
            ConfigError::Invalid(format!("rdf.base_uri must be an absolute IRI: {e}"))
        })?;
        for (field, value) in [
            ("rdf.cascade_chunk_size", self.rdf.cascade_chunk_size),
            ("search.bulk_threshold", self.search.bulk_threshold),
            ("search.bulk_chunk_size", self.search.bulk_chunk_size),
            ("consistency.batch_size", self.consistency.batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be at least 1")));
            }
        }
        Ok(())
    }

    /// With base URI
    #[inline]
    #[must_use]
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.rdf.base_uri = base_uri.into();
        self
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.queue.workers = workers;
        self
    }

    /// With backoff between attempts
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.queue.backoff = backoff;
        self
    }

    /// With bulk threshold and chunk size
    #[inline]
    #[must_use]
    pub fn with_bulk(mut self, threshold: usize, chunk_size: usize) -> Self {
        self.search.bulk_threshold = threshold;
        self.search.bulk_chunk_size = chunk_size;
        self
    }

    /// With checkpoint directory
    #[inline]
    #[must_use]
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.consistency.checkpoint_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn empty_file_is_the_default() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.queue.graph_policy().max_retries(), 5);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            [rdf]
            base_uri = "https://opendata.example.gov"

            [rdf.prefixes]
            adms = "http://www.w3.org/ns/adms#"

            [search]
            bulk_threshold = 25

            [search.index]
            url = "http://search:9200"

            [queue]
            workers = 8

            [queue.backoff]
            kind = "fixed"
            delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.rdf.base_uri, "https://opendata.example.gov");
        assert_eq!(config.rdf.catalog_title, DEFAULT_CATALOG_TITLE);
        assert_eq!(config.rdf.namespaces().get("adms"), Some("http://www.w3.org/ns/adms#"));
        assert!(config.rdf.namespaces().get("dcat").is_some());
        assert_eq!(config.search.bulk_threshold, 25);
        assert_eq!(config.search.bulk_chunk_size, DEFAULT_BULK_CHUNK_SIZE);
        assert_eq!(config.search.index.url, "http://search:9200");
        assert_eq!(config.search.index.index_prefix, "odsync-");
        assert_eq!(config.queue.workers, 8);
        assert_eq!(config.queue.backoff, Backoff::Fixed { delay_ms: 250 });
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odsync.toml");
        let config = SyncConfig::new()
            .with_workers(2)
            .with_checkpoint_dir(dir.path().join("checkpoints"));
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(SyncConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = SyncConfig::from_file("/nonexistent/odsync.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/odsync.toml"));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("ODSYNC_TRIPLE_STORE_URL", "http://fuseki:3030/portal/"),
            ("ODSYNC_SEARCH_URL", "http://es:9200"),
            ("ODSYNC_WORKERS", "12"),
            ("ODSYNC_LOG_LEVEL", "debug"),
            ("ODSYNC_BASE_URI", "https://portal.example.eu"),
        ]
        .into_iter()
        .collect();
        let mut config = SyncConfig::default();
        config
            .apply_overrides(|var| env.get(var).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.triple_store.update_url, "http://fuseki:3030/portal/update");
        assert_eq!(config.triple_store.query_url, "http://fuseki:3030/portal/query");
        assert_eq!(config.search.index.url, "http://es:9200");
        assert_eq!(config.queue.workers, 12);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.rdf.base_uri, "https://portal.example.eu");
    }

    #[test]
    fn bad_worker_override_is_rejected() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_overrides(|var| (var == "ODSYNC_WORKERS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "ODSYNC_WORKERS", .. }));
    }

    #[test]
    fn validation() {
        assert!(SyncConfig::new().with_workers(0).validate().is_err());
        assert!(SyncConfig::new().with_base_uri("data/portal").validate().is_err());
        assert!(SyncConfig::new().with_bulk(0, 10).validate().is_err());
        let mut config = SyncConfig::new();
        config.consistency.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("consistency.batch_size"));
    }
}
