//! Task identity, labels and status tracking

use crate::error::{FailureReason, TaskError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate new ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive fields attached to logs and failure records
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskLabel {
    /// Task type, e.g. `graph` or `search`
    pub task: String,
    /// Entity kind label
    pub entity_kind: String,
    /// Entity id
    pub entity_id: u64,
    /// Operation name
    pub operation: String,
}

impl fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}({}#{})",
            self.task, self.operation, self.entity_kind, self.entity_id
        )
    }
}

/// A unit of work the queue can carry
///
/// Tasks are plain data: they carry ids and operation names, never live
/// entity snapshots, so a retry always re-reads current state.
pub trait QueueTask: Clone + fmt::Debug + Send + Sync + 'static {
    /// Log and failure-record label
    fn label(&self) -> TaskLabel;
}

/// Runs tasks of type `T`
#[async_trait]
pub trait TaskExecutor<T: QueueTask>: Send + Sync + 'static {
    /// Execute one attempt
    ///
    /// # Errors
    /// The attempt's failure, classified for the retry policy.
    async fn execute(&self, task: &T) -> Result<(), TaskError>;
}

/// Lifecycle of an enqueued task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for a worker
    Pending,
    /// Attempt in progress (1-based)
    Running {
        /// Attempt number
        attempt: u32,
    },
    /// Failed attempt, re-enqueue scheduled
    Retrying {
        /// Attempts made so far
        attempt: u32,
        /// Delay before the next attempt
        delay: Duration,
    },
    /// Completed
    Succeeded {
        /// Attempts it took
        attempts: u32,
    },
    /// Permanently failed
    Failed {
        /// Attempts made
        attempts: u32,
        /// Why no further attempt is made
        reason: FailureReason,
        /// Last error
        error: TaskError,
    },
}

impl TaskStatus {
    /// Succeeded or failed
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    /// Attempts made so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Pending => 0,
            Self::Running { attempt } | Self::Retrying { attempt, .. } => *attempt,
            Self::Succeeded { attempts } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Caller-side view of an enqueued task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    rx: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, rx: watch::Receiver<TaskStatus>) -> Self {
        Self { id, rx }
    }

    /// Task ID
    #[inline]
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the task reaches a terminal status
    ///
    /// Returns the last known status if the queue is dropped first.
    pub async fn wait(mut self) -> TaskStatus {
        let terminal = self
            .rx
            .wait_for(TaskStatus::is_terminal)
            .await
            .map(|status| status.clone());
        match terminal {
            Ok(status) => status,
            Err(_) => self.rx.borrow().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_display() {
        let label = TaskLabel {
            task: "graph".to_string(),
            entity_kind: "datasets.Dataset".to_string(),
            entity_id: 42,
            operation: "update".to_string(),
        };
        assert_eq!(label.to_string(), "graph:update(datasets.Dataset#42)");
    }

    #[test]
    fn status_attempts() {
        assert_eq!(TaskStatus::Pending.attempts(), 0);
        assert_eq!(TaskStatus::Running { attempt: 2 }.attempts(), 2);
        assert!(TaskStatus::Succeeded { attempts: 1 }.is_terminal());
        assert!(!TaskStatus::Retrying {
            attempt: 1,
            delay: Duration::ZERO
        }
        .is_terminal());
    }

    #[tokio::test]
    async fn handle_waits_for_terminal_status() {
        let (tx, rx) = watch::channel(TaskStatus::Pending);
        let handle = TaskHandle::new(TaskId::new(), rx);
        let waiter = tokio::spawn(handle.clone().wait());

        tx.send_replace(TaskStatus::Running { attempt: 1 });
        tx.send_replace(TaskStatus::Succeeded { attempts: 1 });

        assert_eq!(waiter.await.unwrap(), TaskStatus::Succeeded { attempts: 1 });
        assert_eq!(handle.status(), TaskStatus::Succeeded { attempts: 1 });
    }
}
