//! odsync Queue - asynchronous retryable tasks
//!
//! Change handlers enqueue graph and search work here and return
//! immediately. A fixed pool of workers executes tasks; each task carries
//! its own [`RetryPolicy`] deciding whether a failed attempt is retried and
//! after what delay.
//!
//! Invariants:
//! - a task is attempted at most `max_retries + 1` times
//! - permanent errors are never retried
//! - a permanently failed task is logged and recorded, never dropped silently

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod policy;
pub mod queue;
pub mod task;

pub use error::{FailureReason, QueueError, TaskError};
pub use policy::{Backoff, RetryDecision, RetryPolicy, RetryPredicate};
pub use queue::{FailureRecord, QueueConfig, QueueStats, TaskQueue};
pub use task::{QueueTask, TaskExecutor, TaskHandle, TaskId, TaskLabel, TaskStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
