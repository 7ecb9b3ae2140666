//! # Weak subscription registry and the exclusive invoke path.
//!
//! [`SubscriptionRegistry`] maps concrete event types to handlers. Each
//! entry pairs a `Weak` reference to the handler with a type-erased invoke
//! thunk built at subscribe time; the thunk downcasts handler and event
//! back to their concrete types and calls [`Handler::handle`].
//!
//! ## Rules
//! - Entries are keyed by the `TypeId` declared at subscribe time and
//!   matched exactly against the runtime type of the dispatched event.
//! - Re-subscribing the same handler for the same type is a no-op;
//!   the same handler may subscribe for several distinct types.
//! - Dead entries (handler dropped elsewhere) are pruned lazily during
//!   add, remove, and target-resolution passes.
//! - **Invoke exclusivity**: at most one dispatch batch (resolve targets +
//!   invoke all) runs at any instant for this registry, regardless of how
//!   many tasks pump events. Handlers of one pump therefore never run
//!   concurrently with each other.
//! - Faults are isolated per handler: a returned failure or a caught
//!   panic is collected and the remaining handlers still run.

use std::any::{Any, TypeId};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{DispatchError, HandlerError, HandlerFailure};
use crate::events::{EnqueueSource, Event};

use super::Handler;

type AnyHandler = dyn Any + Send + Sync;
type InvokeFn =
    dyn Fn(Arc<AnyHandler>, Arc<dyn Event>) -> BoxFuture<'static, Result<(), HandlerFailure>>
        + Send
        + Sync;

/// One (handler, declared event type) association.
struct Subscription {
    /// Declared event type, fixed at subscribe time.
    event_type: TypeId,
    /// Handler identity (allocation address) for dedup and removal.
    key: usize,
    /// Handler name, resolved at subscribe time for error reports.
    label: &'static str,
    /// Non-owning handler reference; dead entries are pruned lazily.
    handler: Weak<AnyHandler>,
    invoke: Arc<InvokeFn>,
}

/// A subscription resolved for one dispatch: the temporary strong
/// reference keeps the handler alive until its invocation finishes.
struct DispatchTarget {
    label: &'static str,
    handler: Arc<AnyHandler>,
    invoke: Arc<InvokeFn>,
}

/// Type-indexed weak subscription table. See the module docs for the
/// matching, lifetime, and exclusivity rules.
pub(crate) struct SubscriptionRegistry {
    /// Registration order is preserved; dispatch honors it.
    entries: Mutex<Vec<Subscription>>,
    /// Serializes dispatch batches system-wide.
    invoke_gate: tokio::sync::Mutex<()>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            invoke_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Inserts a subscription unless a live entry for the same handler and
    /// declared type already exists. Stale entries found during the scan
    /// are pruned.
    pub(crate) fn add<E, H>(&self, handler: &Arc<H>)
    where
        E: Event,
        H: Handler<E>,
    {
        let key = handler_key(handler);
        let label = Handler::<E>::name(handler.as_ref());
        let mut entries = self.lock_entries();
        entries.retain(|entry| entry.handler.strong_count() > 0);
        if entries
            .iter()
            .any(|entry| entry.key == key && entry.event_type == TypeId::of::<E>())
        {
            return;
        }

        let erased: Arc<AnyHandler> = handler.clone();
        let invoke: Arc<InvokeFn> =
            Arc::new(move |handler: Arc<AnyHandler>, event: Arc<dyn Event>| {
                Box::pin(async move {
                    // Both downcasts are guaranteed by construction: the entry
                    // is stored under E's TypeId and holds an H.
                    let Ok(handler) = handler.downcast::<H>() else {
                        return Ok(());
                    };
                    let Some(typed) = event.downcast_ref::<E>() else {
                        return Ok(());
                    };
                    Handler::<E>::handle(handler.as_ref(), typed).await
                })
            });

        entries.push(Subscription {
            event_type: TypeId::of::<E>(),
            key,
            label,
            handler: Arc::downgrade(&erased),
            invoke,
        });
    }

    /// Removes the first live entry for the given handler and declared
    /// type; returns whether one was found. Stale entries encountered
    /// during the scan are pruned.
    pub(crate) fn remove<E, H>(&self, handler: &Arc<H>) -> bool
    where
        E: Event,
        H: Handler<E>,
    {
        let key = handler_key(handler);
        let mut entries = self.lock_entries();
        entries.retain(|entry| entry.handler.strong_count() > 0);
        match entries
            .iter()
            .position(|entry| entry.key == key && entry.event_type == TypeId::of::<E>())
        {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drops all entries.
    pub(crate) fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Number of entries whose handler is still alive.
    pub(crate) fn live_count(&self) -> usize {
        self.lock_entries()
            .iter()
            .filter(|entry| entry.handler.strong_count() > 0)
            .count()
    }

    /// Resolves the subscriptions matching the given runtime event type,
    /// acquiring a temporary strong reference to each live handler and
    /// pruning dead entries found along the way.
    fn dispatch_targets(&self, runtime_type: TypeId) -> Vec<DispatchTarget> {
        let mut entries = self.lock_entries();
        entries.retain(|entry| entry.handler.strong_count() > 0);
        entries
            .iter()
            .filter(|entry| entry.event_type == runtime_type)
            .filter_map(|entry| {
                entry.handler.upgrade().map(|handler| DispatchTarget {
                    label: entry.label,
                    handler,
                    invoke: Arc::clone(&entry.invoke),
                })
            })
            .collect()
    }

    /// Invokes every handler matching the event's runtime type, isolating
    /// faults per handler.
    ///
    /// Returns `None` when every handler succeeded, the single
    /// [`HandlerError`] when exactly one failed, and an aggregate stamped
    /// with the event's provenance otherwise.
    ///
    /// Holds the invoke gate for the whole batch: dispatches are exclusive
    /// system-wide even when multiple tasks pump concurrently.
    pub(crate) async fn invoke_handlers(
        &self,
        event: &Arc<dyn Event>,
        source: EnqueueSource,
    ) -> Option<DispatchError> {
        let _gate = self.invoke_gate.lock().await;
        let targets = self.dispatch_targets(event.runtime_type());

        let mut failures = Vec::new();
        for target in targets {
            let invocation = (target.invoke)(target.handler, Arc::clone(event));
            match AssertUnwindSafe(invocation).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => failures.push(HandlerError::Failed {
                    handler: target.label.into(),
                    failure,
                }),
                Err(payload) => failures.push(HandlerError::Panicked {
                    handler: target.label.into(),
                    message: panic_message(&*payload),
                }),
            }
        }
        DispatchError::from_failures(source, failures)
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stable identity of a handler allocation, used for dedup and removal.
fn handler_key<H>(handler: &Arc<H>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

/// Renders a caught panic payload as text.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Tick(u32);
    impl Event for Tick {}

    #[derive(Debug)]
    struct Tock;
    impl Event for Tock {}

    #[derive(Default)]
    struct Counting {
        hits: AtomicUsize,
    }

    #[async_trait]
    impl Handler<Tick> for Counting {
        async fn handle(&self, _event: &Tick) -> Result<(), HandlerFailure> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[async_trait]
    impl Handler<Tock> for Counting {
        async fn handle(&self, _event: &Tock) -> Result<(), HandlerFailure> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing {
        tag: &'static str,
    }

    #[async_trait]
    impl Handler<Tick> for Failing {
        async fn handle(&self, _event: &Tick) -> Result<(), HandlerFailure> {
            Err(HandlerFailure::new(self.tag))
        }

        fn name(&self) -> &'static str {
            self.tag
        }
    }

    struct Panicking;

    #[async_trait]
    impl Handler<Tick> for Panicking {
        async fn handle(&self, _event: &Tick) -> Result<(), HandlerFailure> {
            panic!("handler blew up");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    fn event(value: u32) -> Arc<dyn Event> {
        Arc::new(Tick(value))
    }

    #[tokio::test]
    async fn test_add_same_handler_same_type_is_noop() {
        let registry = SubscriptionRegistry::new();
        let handler = Arc::new(Counting::default());

        registry.add::<Tick, _>(&handler);
        registry.add::<Tick, _>(&handler);
        assert_eq!(registry.live_count(), 1);

        registry
            .invoke_handlers(&event(1), EnqueueSource::capture())
            .await;
        assert_eq!(handler.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_handler_distinct_types_both_registered() {
        let registry = SubscriptionRegistry::new();
        let handler = Arc::new(Counting::default());

        registry.add::<Tick, _>(&handler);
        registry.add::<Tock, _>(&handler);
        assert_eq!(registry.live_count(), 2);

        let tock: Arc<dyn Event> = Arc::new(Tock);
        registry
            .invoke_handlers(&tock, EnqueueSource::capture())
            .await;
        assert_eq!(handler.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_reports_whether_found() {
        let registry = SubscriptionRegistry::new();
        let handler = Arc::new(Counting::default());

        registry.add::<Tick, _>(&handler);
        assert!(registry.remove::<Tick, _>(&handler));
        assert!(!registry.remove::<Tick, _>(&handler));
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_dead_entries_pruned_on_lookup() {
        let registry = SubscriptionRegistry::new();
        let handler = Arc::new(Counting::default());
        registry.add::<Tick, _>(&handler);
        drop(handler);

        let outcome = registry
            .invoke_handlers(&event(1), EnqueueSource::capture())
            .await;
        assert!(outcome.is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_collected_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let first = Arc::new(Failing { tag: "first" });
        let second = Arc::new(Failing { tag: "second" });
        registry.add::<Tick, _>(&first);
        registry.add::<Tick, _>(&second);

        let error = registry
            .invoke_handlers(&event(1), EnqueueSource::capture())
            .await
            .expect("both handlers fail");
        let names: Vec<&str> = error.failures().iter().map(HandlerError::handler).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_panic_isolated_from_siblings() {
        let registry = SubscriptionRegistry::new();
        let panicking = Arc::new(Panicking);
        let counting = Arc::new(Counting::default());
        registry.add::<Tick, _>(&panicking);
        registry.add::<Tick, _>(&counting);

        let error = registry
            .invoke_handlers(&event(1), EnqueueSource::capture())
            .await
            .expect("panic reported");
        assert_eq!(counting.hits.load(Ordering::SeqCst), 1);
        assert!(matches!(
            error,
            DispatchError::Handler(HandlerError::Panicked { .. })
        ));
        assert!(error.as_message().contains("handler blew up"));
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let registry = SubscriptionRegistry::new();
        let handler = Arc::new(Counting::default());
        registry.add::<Tick, _>(&handler);
        registry.add::<Tock, _>(&handler);

        registry.clear();
        assert_eq!(registry.live_count(), 0);

        registry
            .invoke_handlers(&event(1), EnqueueSource::capture())
            .await;
        assert_eq!(handler.hits.load(Ordering::SeqCst), 0);
    }
}
