//! Worker pool draining a shared channel of tasks
//!
//! - `enqueue` is synchronous and never blocks on the executor
//! - every worker pulls from the same channel, at most one attempt per worker
//! - failed attempts are re-sent after their backoff delay by a detached
//!   timer, so a sleeping retry never occupies a worker
//! - `shutdown` stops intake, drains everything in flight (scheduled retries
//!   included), then stops the workers

use crate::error::{FailureReason, QueueError, TaskError};
use crate::policy::{RetryDecision, RetryPolicy};
use crate::task::{QueueTask, TaskExecutor, TaskHandle, TaskId, TaskLabel, TaskStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name, used in logs and metric labels
    pub name: String,
    /// Number of concurrent workers
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            workers: 4,
        }
    }
}

impl QueueConfig {
    /// Create config
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers,
        }
    }

    /// Validate config
    ///
    /// # Errors
    /// `QueueError::InvalidConfig` when no worker would run.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.workers == 0 {
            return Err(QueueError::InvalidConfig(format!(
                "queue '{}' needs at least one worker",
                self.name
            )));
        }
        Ok(())
    }
}

/// Queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tasks accepted
    pub enqueued: u64,
    /// Attempts started
    pub attempts: u64,
    /// Tasks completed
    pub succeeded: u64,
    /// Retries scheduled
    pub retried: u64,
    /// Tasks permanently failed
    pub failed: u64,
    /// Tasks not yet terminal
    pub pending: usize,
}

/// Permanently failed task, kept for inspection and replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    /// Task ID
    pub task_id: TaskId,
    /// Task label
    pub label: TaskLabel,
    /// Attempts made
    pub attempts: u32,
    /// Why the task was given up
    pub reason: FailureReason,
    /// Last error message
    pub error: String,
    /// When the task was given up
    pub failed_at: DateTime<Utc>,
}

struct Envelope<T> {
    id: TaskId,
    task: T,
    policy: RetryPolicy,
    retry_count: u32,
    last_error: Option<TaskError>,
    status: watch::Sender<TaskStatus>,
}

enum WorkerMessage<T> {
    Run(Envelope<T>),
    Shutdown,
}

struct Shared<T: QueueTask> {
    config: QueueConfig,
    tx: mpsc::UnboundedSender<WorkerMessage<T>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkerMessage<T>>>,
    executor: Arc<dyn TaskExecutor<T>>,
    stats: Mutex<QueueStats>,
    failures: Mutex<Vec<FailureRecord>>,
    live: DashMap<TaskId, TaskLabel>,
    pending: AtomicUsize,
    idle: Notify,
    accepting: AtomicBool,
    abort: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Asynchronous task queue with per-task retry policies
pub struct TaskQueue<T: QueueTask> {
    shared: Arc<Shared<T>>,
}

impl<T: QueueTask> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: QueueTask> std::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.shared.config.name)
            .field("workers", &self.shared.config.workers)
            .field("pending", &self.pending())
            .finish()
    }
}

impl<T: QueueTask> TaskQueue<T> {
    /// Start the worker pool
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `QueueError::InvalidConfig` for a zero-worker config.
    pub fn start(
        config: QueueConfig,
        executor: Arc<dyn TaskExecutor<T>>,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (abort, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            config,
            tx,
            rx: tokio::sync::Mutex::new(rx),
            executor,
            stats: Mutex::new(QueueStats::default()),
            failures: Mutex::new(Vec::new()),
            live: DashMap::new(),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            accepting: AtomicBool::new(true),
            abort,
            workers: Mutex::new(Vec::new()),
        });

        let handles: Vec<_> = (0..shared.config.workers)
            .map(|worker| tokio::spawn(Arc::clone(&shared).worker_loop(worker)))
            .collect();
        *shared.workers.lock() = handles;

        tracing::info!(
            queue = %shared.config.name,
            workers = shared.config.workers,
            "task queue started"
        );
        Ok(Self { shared })
    }

    /// Queue name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Tasks not yet terminal
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Whether new tasks are accepted
    #[inline]
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// Enqueue a task; returns immediately
    ///
    /// # Errors
    /// `QueueError::Closed` once shutdown has begun.
    pub fn enqueue(&self, task: T, policy: RetryPolicy) -> Result<TaskHandle, QueueError> {
        let shared = &self.shared;
        if !shared.accepting.load(Ordering::Acquire) {
            return Err(QueueError::Closed(shared.config.name.clone()));
        }

        let id = TaskId::new();
        let (status, rx) = watch::channel(TaskStatus::Pending);
        let label = task.label();
        shared.live.insert(id, label.clone());
        shared.pending.fetch_add(1, Ordering::AcqRel);

        let envelope = Envelope {
            id,
            task,
            policy,
            retry_count: 0,
            last_error: None,
            status,
        };
        if shared.tx.send(WorkerMessage::Run(envelope)).is_err() {
            shared.settle(id);
            return Err(QueueError::Closed(shared.config.name.clone()));
        }

        shared.stats.lock().enqueued += 1;
        metrics::counter!("odsync_tasks_enqueued_total", "queue" => shared.config.name.clone(), "task" => label.task.clone())
            .increment(1);
        tracing::debug!(queue = %shared.config.name, task_id = %id, task = %label, "task enqueued");
        Ok(TaskHandle::new(id, rx))
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let mut stats = self.shared.stats.lock().clone();
        stats.pending = self.pending();
        stats
    }

    /// Tasks not yet terminal, with their labels
    #[must_use]
    pub fn in_flight(&self) -> Vec<(TaskId, TaskLabel)> {
        self.shared
            .live
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Permanently failed tasks, oldest first
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.shared.failures.lock().clone()
    }

    /// Wait until no task is pending
    pub async fn wait_idle(&self) {
        self.shared.wait_idle().await;
    }

    /// Stop intake, drain every pending task, stop the workers
    pub async fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::Release);
        self.shared.wait_idle().await;
        self.stop_workers().await;
    }

    /// Like [`TaskQueue::shutdown`], but gives up draining after `timeout`
    ///
    /// Scheduled retries and queued tasks are then failed with
    /// [`FailureReason::Shutdown`]; attempts already running finish.
    /// Returns `true` when everything drained in time.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.shared.accepting.store(false, Ordering::Release);
        let drained = tokio::time::timeout(timeout, self.shared.wait_idle())
            .await
            .is_ok();
        if !drained {
            tracing::warn!(
                queue = %self.shared.config.name,
                pending = self.pending(),
                "shutdown timed out, abandoning pending tasks"
            );
            self.shared.abort.send_replace(true);
            self.shared.wait_idle().await;
        }
        self.stop_workers().await;
        drained
    }

    async fn stop_workers(&self) {
        let handles = std::mem::take(&mut *self.shared.workers.lock());
        for _ in 0..handles.len() {
            // Receiver lives in `shared`, send cannot fail here.
            let _ = self.shared.tx.send(WorkerMessage::Shutdown);
        }
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(queue = %self.shared.config.name, error = %err, "worker terminated abnormally");
            }
        }
        tracing::info!(queue = %self.shared.config.name, "task queue stopped");
    }
}

impl<T: QueueTask> Shared<T> {
    async fn worker_loop(self: Arc<Self>, worker: usize) {
        loop {
            let message = {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            };
            match message {
                Some(WorkerMessage::Run(envelope)) => Arc::clone(&self).run(envelope).await,
                Some(WorkerMessage::Shutdown) | None => break,
            }
        }
        tracing::trace!(queue = %self.config.name, worker, "worker exiting");
    }

    fn is_aborting(&self) -> bool {
        *self.abort.borrow()
    }

    async fn run(self: Arc<Self>, mut envelope: Envelope<T>) {
        if self.is_aborting() {
            let error = envelope
                .last_error
                .take()
                .unwrap_or_else(|| TaskError::Failed("queue shut down".to_string()));
            self.fail(envelope, FailureReason::Shutdown, error);
            return;
        }

        let attempt = envelope.retry_count + 1;
        let label = envelope.task.label();
        envelope.status.send_replace(TaskStatus::Running { attempt });
        self.stats.lock().attempts += 1;

        let span = tracing::info_span!(
            "task",
            queue = %self.config.name,
            task_id = %envelope.id,
            task = %label,
            attempt
        );
        let result = AssertUnwindSafe(self.executor.execute(&envelope.task))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|_| Err(TaskError::Failed("executor panicked".to_string())));

        let entered = span.enter();
        match result {
            Ok(()) => {
                tracing::debug!("task succeeded");
                self.stats.lock().succeeded += 1;
                metrics::counter!("odsync_tasks_succeeded_total", "queue" => self.config.name.clone(), "task" => label.task.clone())
                    .increment(1);
                envelope
                    .status
                    .send_replace(TaskStatus::Succeeded { attempts: attempt });
                self.settle(envelope.id);
            }
            Err(error) => match envelope.policy.decide(&error, envelope.retry_count) {
                RetryDecision::Retry { delay } => {
                    tracing::warn!(
                        error = %error,
                        class = error.class(),
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "task attempt failed, retrying"
                    );
                    self.stats.lock().retried += 1;
                    metrics::counter!("odsync_task_retries_total", "queue" => self.config.name.clone(), "class" => error.class())
                        .increment(1);
                    envelope
                        .status
                        .send_replace(TaskStatus::Retrying { attempt, delay });
                    envelope.retry_count += 1;
                    envelope.last_error = Some(error);
                    drop(entered);
                    Arc::clone(&self).schedule(envelope, delay);
                }
                RetryDecision::GiveUp(reason) => {
                    drop(entered);
                    self.fail(envelope, reason, error);
                }
            },
        }
    }

    fn schedule(self: Arc<Self>, envelope: Envelope<T>, delay: Duration) {
        if delay.is_zero() {
            self.dispatch(envelope);
            return;
        }
        if self.is_aborting() {
            self.dispatch(envelope);
            return;
        }
        let mut abort = self.abort.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => self.dispatch(envelope),
                Ok(()) = abort.changed() => {
                    let mut envelope = envelope;
                    let error = envelope
                        .last_error
                        .take()
                        .unwrap_or_else(|| TaskError::Failed("queue shut down".to_string()));
                    self.fail(envelope, FailureReason::Shutdown, error);
                }
            }
        });
    }

    fn dispatch(&self, envelope: Envelope<T>) {
        if let Err(mpsc::error::SendError(message)) = self.tx.send(WorkerMessage::Run(envelope)) {
            if let WorkerMessage::Run(mut envelope) = message {
                let error = envelope
                    .last_error
                    .take()
                    .unwrap_or_else(|| TaskError::Failed("queue channel closed".to_string()));
                self.fail(envelope, FailureReason::Shutdown, error);
            }
        }
    }

    fn fail(&self, envelope: Envelope<T>, reason: FailureReason, error: TaskError) {
        let attempts = envelope.retry_count + u32::from(reason != FailureReason::Shutdown);
        let label = envelope.task.label();
        tracing::error!(
            queue = %self.config.name,
            task_id = %envelope.id,
            task = %label,
            attempts,
            reason = reason.as_str(),
            error = %error,
            "task permanently failed"
        );
        metrics::counter!("odsync_tasks_failed_total", "queue" => self.config.name.clone(), "reason" => reason.as_str())
            .increment(1);

        self.stats.lock().failed += 1;
        self.failures.lock().push(FailureRecord {
            task_id: envelope.id,
            label,
            attempts,
            reason,
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        envelope.status.send_replace(TaskStatus::Failed {
            attempts,
            reason,
            error,
        });
        self.settle(envelope.id);
    }

    fn settle(&self, id: TaskId) {
        self.live.remove(&id);
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}
