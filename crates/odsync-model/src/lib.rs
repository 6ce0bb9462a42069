//! odsync Model - entities as seen by the synchronization pipeline
//!
//! - [`EntityKind`], [`EntityId`], [`EntityRef`]: addressing
//! - [`Entity`] and its records: the authoritative row state
//! - [`EntityStore`]: narrow read interface to the relational store
//! - [`MemoryStore`]: in-memory implementation
//! - [`RelatedEntities`]: visible related rows embedded by projections
//! - [`WatchedFields`]: which field changes cascade to dependents

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod entity;
pub mod kind;
pub mod related;
pub mod store;
pub mod watched;

pub use entity::{
    slugify, Category, Dataset, Entity, License, Lifecycle, Organization, Resource, Status,
};
pub use kind::{EntityId, EntityKind, EntityRef, UnknownKind};
pub use related::RelatedEntities;
pub use store::{EntityStore, MemoryStore, StoreError};
pub use watched::{WatchedFields, ALL_FIELDS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
