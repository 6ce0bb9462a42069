//! On-commit event scheduling
//!
//! Events raised while a relational transaction is open are held back and
//! published only when it commits, so workers never read uncommitted rows.
//! Rolling back, or dropping the transaction without committing, discards
//! them.

use odsync_events::{ChangeEvent, DispatchReport, EventBus, EventError};

/// Events collected during one relational transaction
#[derive(Debug)]
#[must_use = "events are discarded unless the transaction is committed"]
pub struct Transaction<'a> {
    bus: &'a EventBus,
    pending: Vec<ChangeEvent>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// Open a transaction publishing to `bus`
    pub fn new(bus: &'a EventBus) -> Self {
        Self {
            bus,
            pending: Vec::new(),
            finished: false,
        }
    }

    /// Hold `event` until commit
    pub fn record(&mut self, event: ChangeEvent) {
        self.pending.push(event);
    }

    /// Events held so far
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[ChangeEvent] {
        &self.pending
    }

    /// Dispatch `event` now in strict mode, for hooks that must be able to
    /// abort the transaction
    ///
    /// # Errors
    /// The first failing handler's error.
    pub fn publish_strict(&self, event: &ChangeEvent) -> Result<DispatchReport, EventError> {
        self.bus.publish_strict(event)
    }

    /// Publish every held event in robust mode, in recording order
    pub fn commit(mut self) -> DispatchReport {
        self.finished = true;
        let mut report = DispatchReport::default();
        for event in std::mem::take(&mut self.pending) {
            let one = self.bus.publish_robust(&event);
            report.delivered += one.delivered;
            report.failures.extend(one.failures);
        }
        tracing::debug!(
            delivered = report.delivered,
            failed = report.failures.len(),
            "transaction committed"
        );
        report
    }

    /// Discard every held event; returns how many were dropped
    pub fn rollback(mut self) -> usize {
        self.finished = true;
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.pending.is_empty() {
            tracing::warn!(
                events = self.pending.len(),
                "transaction dropped without commit, events discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_events::{HandlerError, Operation, Subscription};
    use odsync_model::{EntityKind, EntityRef};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn bus_with_log() -> (EventBus, Arc<Mutex<Vec<EntityRef>>>) {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        bus.subscribe_fn("log", Subscription::all(), move |event| {
            sink.lock().push(event.entity());
            Ok(())
        });
        (bus, log)
    }

    fn event(id: u64) -> ChangeEvent {
        ChangeEvent::new(EntityRef::new(EntityKind::Dataset, id), Operation::Updated)
    }

    #[test]
    fn nothing_is_published_before_commit() {
        let (bus, log) = bus_with_log();
        let mut tx = Transaction::new(&bus);
        tx.record(event(1));
        tx.record(event(2));
        assert!(log.lock().is_empty());

        let report = tx.commit();
        assert_eq!(report.delivered, 2);
        assert_eq!(
            *log.lock(),
            vec![
                EntityRef::new(EntityKind::Dataset, 1),
                EntityRef::new(EntityKind::Dataset, 2)
            ]
        );
    }

    #[test]
    fn rollback_and_drop_discard() {
        let (bus, log) = bus_with_log();
        let mut tx = Transaction::new(&bus);
        tx.record(event(1));
        assert_eq!(tx.rollback(), 1);

        {
            let mut tx = Transaction::new(&bus);
            tx.record(event(2));
        }
        assert!(log.lock().is_empty());
    }

    #[test]
    fn strict_hooks_can_abort() {
        let bus = EventBus::new();
        bus.subscribe_fn("validate", Subscription::all(), |_| {
            Err(HandlerError::new("title missing"))
        });
        let tx = Transaction::new(&bus);
        let err = tx.publish_strict(&event(1)).unwrap_err();
        assert!(matches!(err, EventError::HandlerFailed { .. }));
        drop(tx);
    }
}
