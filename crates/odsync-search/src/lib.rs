//! odsync Search - keeps the document index aligned with the relational store
//!
//! - [`DocumentBuilder`]: denormalized document per entity, rebuilt in full
//! - [`DocumentSynchronizer`]: `update_document` / `remove_document` with
//!   dependent fan-out, bulked when large
//! - [`SearchIndex`]: narrow index interface, [`HttpSearchIndex`] and
//!   [`MemoryIndex`] implementations
//! - [`ConsistencyChecker`]: resumable store/index drift report
//!
//! # Example
//!
//! ```ignore
//! let sync = DocumentSynchronizer::new(store, index);
//! sync.update_document(EntityRef::new(EntityKind::License, 3)).await?;
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod checkpoint;
pub mod consistency;
pub mod document;
pub mod error;
pub mod http;
pub mod index;
pub mod mapping;
pub mod sync;

pub use checkpoint::{CheckPhase, Checkpoint, CheckpointStore, FileCheckpoints, MemoryCheckpoints};
pub use consistency::{CheckRun, ConsistencyChecker, ConsistencyReport, DEFAULT_BATCH_SIZE};
pub use document::{BulkOp, SearchDocument, SearchOp, SearchTask};
pub use error::SearchError;
pub use http::{HttpSearchIndex, SearchIndexConfig};
pub use index::{MemoryIndex, SearchIndex};
pub use mapping::{
    default_document_mappings, CategoryDocument, DatasetDocument, DocumentBuilder,
    DocumentMapping, LicenseDocument, OrganizationDocument, ResourceDocument,
};
pub use sync::{DocumentSynchronizer, SyncOutcome, DEFAULT_BULK_CHUNK_SIZE, DEFAULT_BULK_THRESHOLD};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
