//! Synchronous event bus
//!
//! Handlers run inline, in registration order, on the publishing thread.
//! They are expected to be cheap: typically they only enqueue work.
//!
//! Two dispatch modes exist:
//! - [`DispatchMode::Strict`]: the first handler error aborts dispatch and
//!   propagates to the publisher (pre-save style hooks)
//! - [`DispatchMode::Robust`]: every matching handler runs; failures are
//!   collected in the [`DispatchReport`] (post-save fan-out)

use crate::error::{EventError, HandlerError};
use crate::event::{ChangeEvent, Operation};
use odsync_model::EntityKind;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Event consumer
pub trait Handler: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    /// React to an event
    fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError>;
}

/// Handler backed by a closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync,
{
    /// Wrap closure
    #[inline]
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError> {
        (self.f)(event)
    }
}

/// Which events a handler receives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    kinds: Option<Vec<EntityKind>>,
    operations: Option<Vec<Operation>>,
}

impl Subscription {
    /// Every event
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to entity kinds
    #[must_use]
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Restrict to operations
    #[must_use]
    pub fn operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations = Some(operations.into_iter().collect());
        self
    }

    /// Whether `event` is delivered under this subscription
    #[must_use]
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let kind_ok = self
            .kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind()));
        let op_ok = self
            .operations
            .as_ref()
            .map_or(true, |ops| ops.contains(&event.operation()));
        kind_ok && op_ok
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Dispatch failure semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Stop at and propagate the first handler error
    Strict,
    /// Run every handler, collect failures
    #[default]
    Robust,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Handlers that ran successfully
    pub delivered: usize,
    /// Handlers that failed (robust mode only)
    pub failures: Vec<(String, HandlerError)>,
}

impl DispatchReport {
    /// Whether every handler succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Registered {
    id: SubscriptionId,
    subscription: Subscription,
    handler: Arc<dyn Handler>,
}

/// Typed event bus
///
/// Constructed once at process start and passed to whoever publishes.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<Registered>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.len())
            .finish()
    }
}

impl EventBus {
    /// Create empty bus
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it runs after every previously registered one
    pub fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn Handler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push(Registered {
            id,
            subscription,
            handler,
        });
        id
    }

    /// Register a closure handler
    pub fn subscribe_fn<F>(&self, name: &str, subscription: Subscription, f: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(subscription, Arc::new(FnHandler::new(name, f)))
    }

    /// Remove a handler
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|r| r.id != id);
        handlers.len() != before
    }

    /// Number of registered handlers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handler is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Deliver `event` to every matching handler
    ///
    /// # Errors
    /// In strict mode, `EventError::HandlerFailed` for the first failing
    /// handler; later handlers do not run.
    pub fn publish(
        &self,
        event: &ChangeEvent,
        mode: DispatchMode,
    ) -> Result<DispatchReport, EventError> {
        // Snapshot so handlers may subscribe without deadlocking.
        let targets: Vec<Arc<dyn Handler>> = self
            .handlers
            .read()
            .iter()
            .filter(|r| r.subscription.matches(event))
            .map(|r| Arc::clone(&r.handler))
            .collect();

        tracing::trace!(
            entity = %event.entity(),
            operation = %event.operation(),
            handlers = targets.len(),
            "dispatching change event"
        );

        let mut report = DispatchReport::default();
        for handler in targets {
            match handler.handle(event) {
                Ok(()) => report.delivered += 1,
                Err(source) => match mode {
                    DispatchMode::Strict => {
                        return Err(EventError::HandlerFailed {
                            handler: handler.name().to_string(),
                            source,
                        });
                    }
                    DispatchMode::Robust => {
                        tracing::warn!(
                            handler = handler.name(),
                            entity = %event.entity(),
                            operation = %event.operation(),
                            error = %source,
                            "event handler failed"
                        );
                        report.failures.push((handler.name().to_string(), source));
                    }
                },
            }
        }
        Ok(report)
    }

    /// Robust dispatch
    pub fn publish_robust(&self, event: &ChangeEvent) -> DispatchReport {
        // Robust dispatch never returns Err.
        self.publish(event, DispatchMode::Robust)
            .unwrap_or_default()
    }

    /// Strict dispatch
    pub fn publish_strict(&self, event: &ChangeEvent) -> Result<DispatchReport, EventError> {
        self.publish(event, DispatchMode::Strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_model::EntityRef;
    use parking_lot::Mutex;

    fn event(kind: EntityKind, op: Operation) -> ChangeEvent {
        ChangeEvent::new(EntityRef::new(kind, 1), op)
    }

    fn recorder(bus: &EventBus, log: &Arc<Mutex<Vec<String>>>, name: &'static str, fail: bool) {
        let log = Arc::clone(log);
        bus.subscribe_fn(name, Subscription::all(), move |_| {
            log.lock().push(name.to_string());
            if fail {
                Err(HandlerError::new(format!("{name} failed")))
            } else {
                Ok(())
            }
        });
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, &log, "first", false);
        recorder(&bus, &log, "second", false);
        recorder(&bus, &log, "third", false);

        let report = bus.publish_robust(&event(EntityKind::Dataset, Operation::Updated));
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn robust_mode_continues_past_failures() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, &log, "first", true);
        recorder(&bus, &log, "second", false);

        let report = bus.publish_robust(&event(EntityKind::Dataset, Operation::Updated));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "first");
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn strict_mode_stops_at_first_failure() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, &log, "first", true);
        recorder(&bus, &log, "second", false);

        let result = bus.publish_strict(&event(EntityKind::Dataset, Operation::Updated));
        assert!(matches!(
            result,
            Err(EventError::HandlerFailed { ref handler, .. }) if handler == "first"
        ));
        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[test]
    fn subscription_filters_kind_and_operation() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        bus.subscribe_fn(
            "licenses",
            Subscription::all()
                .kinds([EntityKind::License])
                .operations([Operation::Updated]),
            move |e| {
                sink.lock().push(e.operation().to_string());
                Ok(())
            },
        );

        bus.publish_robust(&event(EntityKind::Dataset, Operation::Updated));
        bus.publish_robust(&event(EntityKind::License, Operation::Created));
        let report = bus.publish_robust(&event(EntityKind::License, Operation::Updated));

        assert_eq!(report.delivered, 1);
        assert_eq!(*log.lock(), vec!["updated"]);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let id = bus.subscribe_fn("noop", Subscription::all(), |_| Ok(()));
        assert_eq!(bus.len(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(bus.is_empty());
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe_fn("registrar", Subscription::all(), move |_| {
            inner.subscribe_fn("late", Subscription::all(), |_| Ok(()));
            Ok(())
        });

        let report = bus.publish_robust(&event(EntityKind::Dataset, Operation::Created));
        assert_eq!(report.delivered, 1);
        assert_eq!(bus.len(), 2);
    }
}
