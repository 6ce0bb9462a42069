//! odsync RDF - terms, SPARQL updates and triple store clients
//!
//! Provides:
//! - [`Iri`], [`Literal`], [`Term`], [`Triple`] with SPARQL rendering
//! - vocabulary constants and [`Namespaces`] prefix bindings
//! - [`SparqlUpdate`], an ordered atomic list of [`UpdateOp`]s
//! - the [`TripleStore`] interface with HTTP and in-memory backends

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod http;
pub mod store;
pub mod term;
pub mod update;
pub mod vocab;

pub use error::{TermError, TripleStoreError};
pub use http::{HttpTripleStore, TripleStoreConfig};
pub use store::{MemoryTripleStore, TripleStore};
pub use term::{Iri, Literal, Term, Triple};
pub use update::{select_objects, SparqlUpdate, UpdateOp};
pub use vocab::Namespaces;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
