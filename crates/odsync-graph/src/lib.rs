//! odsync Graph - keeps the RDF projection of the relational store current
//!
//! - [`GraphMapping`]: field-to-predicate mapping per entity kind
//! - [`GraphRegistry`]: runs [`GraphTask`]s against a [`odsync_rdf::TripleStore`]
//! - [`CatalogAggregator`]: recomputes the catalog's `dct:modified`
//! - [`UriScheme`]: deterministic subjects from kind and id
//!
//! # Example
//!
//! ```ignore
//! let registry = GraphRegistry::new(scheme, store, triples);
//! registry
//!     .process_graph(&GraphTask::new(GraphOp::UpdateWithRelated, EntityKind::License, 3))
//!     .await?;
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod catalog;
pub mod error;
pub mod mapping;
pub mod op;
pub mod registry;
pub mod uri;

pub use catalog::{CatalogAggregator, CatalogMembers, DEFAULT_CATALOG_TITLE};
pub use error::{GraphError, MappingError};
pub use mapping::{
    default_mappings, CategoryGraph, DatasetGraph, GraphMapping, LicenseGraph, MappingContext,
    OrganizationGraph, ResourceGraph,
};
pub use op::{GraphOp, GraphTask};
pub use registry::{GraphOutcome, GraphRegistry, DEFAULT_CASCADE_CHUNK_SIZE};
pub use uri::UriScheme;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
