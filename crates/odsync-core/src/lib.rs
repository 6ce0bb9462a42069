//! odsync Core - the assembled synchronization pipeline
//!
//! Wires the change event bus, the task queue, the graph registry and the
//! document synchronizer together:
//! - [`SyncConfig`]: TOML configuration with environment overrides
//! - [`Pipeline`]: enqueue entrypoints, consistency checks, shutdown
//! - [`TaskRouter`]: turns each committed [`odsync_events::ChangeEvent`]
//!   into graph and search tasks
//! - [`Transaction`]: holds events back until the relational commit
//!
//! # Example
//!
//! ```rust,ignore
//! use odsync_core::{Pipeline, SyncConfig};
//!
//! let pipeline = Pipeline::builder(SyncConfig::load(None)?, store).build()?;
//! let mut tx = pipeline.transaction();
//! tx.record(ChangeEvent::new(dataset, Operation::Published));
//! tx.commit();
//! pipeline.update_related_graph(EntityKind::License, 3)?.wait().await;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod routing;
pub mod task;
pub mod transaction;

pub use config::{
    ConsistencyConfig, LoggingConfig, QueueSettings, RdfConfig, SearchConfig, SyncConfig,
};
pub use error::{ConfigError, SyncError};
pub use logging::init_tracing;
pub use pipeline::{consistency_checker, Pipeline, PipelineBuilder};
pub use routing::{graph_tasks, search_tasks, TaskRouter};
pub use task::{SyncExecutor, SyncTask};
pub use transaction::Transaction;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
