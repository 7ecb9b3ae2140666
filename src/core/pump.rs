//! # The event pump: FIFO queue + shutdown state machine.
//!
//! [`EventPump`] accepts events from any number of producers and
//! dispatches them — one at a time, in enqueue order — to the handlers
//! registered for each event's concrete type.
//!
//! ## Rules
//! - **FIFO**: insertion at tail, removal at head; dispatch order is
//!   enqueue order.
//! - **Single dispatch**: at most one event is fully dispatched at a time,
//!   however many tasks call [`handle_one`](EventPump::handle_one) /
//!   [`handle_all`](EventPump::handle_all).
//! - **Provenance**: every accepted event is stamped with the source
//!   location of its enqueue call, exactly once.
//! - **Close protocol** (strictly forward, duplicate calls absorbed):
//!   1. [`request_close`](EventPump::request_close) enqueues one
//!      [`CloseRequest`]; repeats are dropped while one is pending.
//!   2. Handlers may veto it; otherwise
//!      [`begin_close`](EventPump::begin_close) runs, purging moot close
//!      requests and enqueuing [`Closing`].
//!   3. After `Closing` is handled, [`Closed`] is enqueued; nothing may
//!      follow it.
//!   4. After `Closed` is handled the pump is terminal: registry cleared,
//!      `wait_for_closed` released forever.
//! - **Failures stay observable**: a dispatch failure goes to the waiting
//!   receipt if there is one, otherwise it is re-enqueued as
//!   [`UnhandledException`]. A failure escaping *that* dispatch is
//!   terminal and goes to the `tracing` sink.
//!
//! Built-in events enqueued by hand route through the same special rules
//! as the named operations, so the protocol invariants hold for every
//! entry path.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::PumpConfig;
use crate::error::{DispatchError, PumpError};
use crate::events::{CloseRequest, Closed, Closing, EnqueueSource, Event, UnhandledException};
use crate::subscribers::{Handler, SubscriptionRegistry};

use super::envelope::{DispatchReceipt, QueuedEvent};
use super::status::{PumpStatus, StatusCell};

/// Queue state guarded by the pump mutex. Never held across an `.await`.
struct PumpQueue {
    fifo: VecDeque<QueuedEvent>,
    /// True while a `CloseRequest` is queued or being handled; keeps
    /// repeated `request_close` calls from stacking up.
    close_pending: bool,
}

/// Thread-safe FIFO event queue with typed subscriptions and a
/// cooperative multi-phase shutdown protocol.
///
/// The pump itself is passive: someone must drive it through
/// [`handle_one`](EventPump::handle_one) /
/// [`handle_all`](EventPump::handle_all). Wrap it in a
/// [`PumpWorker`](crate::PumpWorker) for an autonomous queue.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use eventide::{EventPump, Handler, HandlerFailure};
///
/// #[derive(Debug)]
/// struct Greet(&'static str);
/// impl eventide::Event for Greet {}
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Handler<Greet> for Greeter {
///     async fn handle(&self, event: &Greet) -> Result<(), HandlerFailure> {
///         println!("hello, {}", event.0);
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pump = EventPump::new();
/// let greeter = Arc::new(Greeter);
/// pump.subscribe::<Greet, _>(&greeter).expect("pump open");
///
/// pump.enqueue(Greet("world")).expect("pump open");
/// pump.handle_all().await;
/// # }
/// ```
pub struct EventPump {
    queue: Mutex<PumpQueue>,
    status: StatusCell,
    registry: SubscriptionRegistry,
    /// Set while the FIFO is non-empty, cleared when it empties; both
    /// updates happen under the queue mutex.
    available: watch::Sender<bool>,
    /// Cancelled once, when the pump reaches terminal `Closed`.
    closed: CancellationToken,
    config: PumpConfig,
}

impl EventPump {
    /// Creates a pump with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PumpConfig::default())
    }

    /// Creates a pump with the given configuration.
    pub fn with_config(config: PumpConfig) -> Self {
        let (available, _) = watch::channel(false);
        Self {
            queue: Mutex::new(PumpQueue {
                fifo: VecDeque::new(),
                close_pending: false,
            }),
            status: StatusCell::new(),
            registry: SubscriptionRegistry::new(),
            available,
            closed: CancellationToken::new(),
            config,
        }
    }

    // ---------------------------
    // Subscriptions
    // ---------------------------

    /// Registers `handler` for events whose runtime type is `E`.
    ///
    /// The registry holds the handler **weakly**: keep the `Arc` alive for
    /// as long as the handler should receive events. Re-subscribing the
    /// same handler for the same type is a no-op; distinct types register
    /// independently.
    ///
    /// Fails with [`PumpError::SubscribeAfterClose`] once shutdown has
    /// begun, which guarantees no handler ever observes [`Closed`]
    /// without a preceding [`Closing`].
    pub fn subscribe<E, H>(&self, handler: &Arc<H>) -> Result<(), PumpError>
    where
        E: Event,
        H: Handler<E>,
    {
        let status = self.status.load();
        if status >= PumpStatus::ClosingEnqueued {
            return Err(PumpError::SubscribeAfterClose { status });
        }
        self.registry.add::<E, H>(handler);
        Ok(())
    }

    /// Removes the subscription of `handler` for `E`; returns whether one
    /// was found.
    pub fn unsubscribe<E, H>(&self, handler: &Arc<H>) -> bool
    where
        E: Event,
        H: Handler<E>,
    {
        self.registry.remove::<E, H>(handler)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.live_count()
    }

    // ---------------------------
    // Enqueue family
    // ---------------------------

    /// Appends an event to the FIFO tail and returns immediately.
    ///
    /// Provenance is stamped from this call site. Fails with
    /// [`PumpError::EnqueueAfterClose`] once [`Closed`] has been enqueued;
    /// never fails before that for ordinary events.
    #[track_caller]
    pub fn enqueue<E: Event>(&self, event: E) -> Result<(), PumpError> {
        self.enqueue_arc(Arc::new(event))
    }

    /// [`enqueue`](EventPump::enqueue) for an already-shared event.
    #[track_caller]
    pub fn enqueue_arc(&self, event: Arc<dyn Event>) -> Result<(), PumpError> {
        self.admit(QueuedEvent::new(event, EnqueueSource::capture()))
    }

    /// Enqueues an event and returns a [`DispatchReceipt`] that resolves
    /// once its handlers have run.
    ///
    /// `receipt.await` waits asynchronously;
    /// [`receipt.wait()`](DispatchReceipt::wait) blocks a plain thread.
    /// Both observe the same outcome: `Ok(())`, or the collected handler
    /// failure for this dispatch.
    #[track_caller]
    pub fn enqueue_and_wait<E: Event>(&self, event: E) -> Result<DispatchReceipt, PumpError> {
        let (queued, receipt) = QueuedEvent::with_receipt(Arc::new(event), EnqueueSource::capture());
        self.admit(queued)?;
        Ok(receipt)
    }

    /// Enqueues a [`CloseRequest`].
    ///
    /// No-op while a close request is already pending or once shutdown has
    /// begun — shutdown cannot be re-requested mid-flight.
    #[track_caller]
    pub fn request_close(&self) {
        let _ = self.enqueue(CloseRequest::new());
    }

    /// Enqueues [`Closing`], moving the pump to `ClosingEnqueued`.
    ///
    /// The winning call purges already-queued close requests (they are
    /// moot) before enqueuing; duplicate calls are silently absorbed.
    #[track_caller]
    pub fn begin_close(&self) {
        let _ = self.enqueue(Closing);
    }

    // ---------------------------
    // Dispatch drive
    // ---------------------------

    /// Dequeues the head event and dispatches it; returns false when the
    /// FIFO was empty.
    ///
    /// After the handlers finish, the built-in completion side effects run
    /// (close protocol advancement), then the event's completion signal is
    /// resolved — or an unobserved failure is re-enqueued as
    /// [`UnhandledException`].
    pub async fn handle_one(&self) -> bool {
        let queued = {
            let mut queue = self.lock_queue();
            let Some(queued) = queue.fifo.pop_front() else {
                return false;
            };
            if queue.fifo.is_empty() {
                self.available.send_replace(false);
            }
            queued
        };

        let failure = self
            .registry
            .invoke_handlers(&queued.event, queued.source)
            .await;
        self.apply_completion_effects(&queued.event);
        self.settle(queued, failure);
        true
    }

    /// Repeatedly dispatches while entries remain.
    pub async fn handle_all(&self) {
        while self.handle_one().await {}
    }

    /// Waits until the FIFO is non-empty, or the pump has closed.
    pub async fn wait_for_event(&self) {
        let mut available = self.available.subscribe();
        loop {
            if *available.borrow_and_update() || self.is_closed() {
                return;
            }
            tokio::select! {
                _ = self.closed.cancelled() => return,
                changed = available.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Waits until the pump has reached terminal [`PumpStatus::Closed`].
    pub async fn wait_for_closed(&self) {
        self.closed.cancelled().await;
    }

    // ---------------------------
    // State queries
    // ---------------------------

    /// True if the FIFO currently holds at least one event.
    pub fn has_events(&self) -> bool {
        !self.lock_queue().fifo.is_empty()
    }

    /// True once the pump has reached terminal [`PumpStatus::Closed`].
    pub fn is_closed(&self) -> bool {
        self.status.load() == PumpStatus::Closed
    }

    /// Current lifecycle status.
    pub fn status(&self) -> PumpStatus {
        self.status.load()
    }

    /// Label from this pump's configuration.
    pub fn label(&self) -> &str {
        &self.config.label
    }

    // ---------------------------
    // Admission (all FIFO mutation and status transitions happen here,
    // under the queue mutex)
    // ---------------------------

    fn admit(&self, queued: QueuedEvent) -> Result<(), PumpError> {
        if queued.event.is::<CloseRequest>() {
            self.admit_close_request(queued);
            return Ok(());
        }
        if queued.event.is::<Closing>() {
            self.admit_closing(queued);
            return Ok(());
        }
        if queued.event.is::<Closed>() {
            self.admit_closed(queued);
            return Ok(());
        }
        self.admit_ordinary(queued)
    }

    fn admit_ordinary(&self, queued: QueuedEvent) -> Result<(), PumpError> {
        let mut queue = self.lock_queue();
        let status = self.status.load();
        if status >= PumpStatus::ClosedEnqueued {
            return Err(PumpError::EnqueueAfterClose { status });
        }
        self.push_locked(&mut queue, queued);
        Ok(())
    }

    fn admit_close_request(&self, mut queued: QueuedEvent) {
        let mut queue = self.lock_queue();
        if self.status.load() >= PumpStatus::ClosingEnqueued || queue.close_pending {
            drop(queue);
            // Shutdown already in motion; the request's intent is met.
            let _ = queued.resolve(Ok(()));
            return;
        }
        queue.close_pending = true;
        self.push_locked(&mut queue, queued);
    }

    fn admit_closing(&self, mut queued: QueuedEvent) {
        let mut queue = self.lock_queue();
        if !self
            .status
            .advance(PumpStatus::Open, PumpStatus::ClosingEnqueued)
        {
            drop(queue);
            let _ = queued.resolve(Ok(()));
            return;
        }

        // Queued close requests are moot once closing has begun.
        let mut kept = VecDeque::with_capacity(queue.fifo.len());
        for mut entry in queue.fifo.drain(..) {
            if entry.event.is::<CloseRequest>() {
                let _ = entry.resolve(Ok(()));
            } else {
                kept.push_back(entry);
            }
        }
        queue.fifo = kept;
        queue.close_pending = false;
        self.push_locked(&mut queue, queued);
    }

    fn admit_closed(&self, mut queued: QueuedEvent) {
        let mut queue = self.lock_queue();
        if !self
            .status
            .advance(PumpStatus::ClosingEnqueued, PumpStatus::ClosedEnqueued)
        {
            drop(queue);
            let _ = queued.resolve(Ok(()));
            return;
        }
        self.push_locked(&mut queue, queued);
    }

    fn push_locked(&self, queue: &mut MutexGuard<'_, PumpQueue>, queued: QueuedEvent) {
        queue.fifo.push_back(queued);
        if self.config.high_watermark > 0 && queue.fifo.len() == self.config.high_watermark {
            tracing::warn!(
                pump = %self.config.label,
                depth = queue.fifo.len(),
                "event queue reached its high watermark"
            );
        }
        self.available.send_replace(true);
    }

    // ---------------------------
    // Completion
    // ---------------------------

    /// Runs the close-protocol side effects tied to a built-in event, after
    /// its handlers have finished.
    fn apply_completion_effects(&self, event: &Arc<dyn Event>) {
        if let Some(request) = event.downcast_ref::<CloseRequest>() {
            let proceed = request.can_begin_close();
            {
                let mut queue = self.lock_queue();
                queue.close_pending = false;
            }
            if proceed {
                self.begin_close();
            }
        } else if event.is::<Closing>() {
            let _ = self.enqueue(Closed);
        } else if event.is::<Closed>() {
            self.status
                .advance(PumpStatus::ClosedEnqueued, PumpStatus::Closed);
            self.registry.clear();
            self.closed.cancel();
            tracing::debug!(pump = %self.config.label, "pump closed");
        }
    }

    /// Resolves the wrapper's completion signal; failures nobody observed
    /// are escalated.
    fn settle(&self, mut queued: QueuedEvent, failure: Option<DispatchError>) {
        let outcome = match failure {
            Some(error) => Err(error),
            None => Ok(()),
        };
        if let Some(Err(error)) = queued.resolve(outcome) {
            self.escalate(&queued.event, error, queued.source);
        }
    }

    /// Re-enqueues an unobserved failure as [`UnhandledException`], so it
    /// stays observable. Two conditions are terminal and fall through to a
    /// last-resort log write: the failing event was itself an
    /// `UnhandledException`, or the pump no longer accepts events.
    fn escalate(&self, event: &Arc<dyn Event>, error: DispatchError, origin: EnqueueSource) {
        if event.is::<UnhandledException>() {
            tracing::error!(
                pump = %self.config.label,
                error = %error,
                origin = %origin,
                "failure while dispatching an unhandled-exception event; abandoning"
            );
            return;
        }
        let relay: Arc<UnhandledException> = Arc::new(UnhandledException::new(error, origin));
        let as_event: Arc<dyn Event> = relay.clone();
        if self.enqueue_arc(as_event).is_err() {
            tracing::error!(
                pump = %self.config.label,
                error = %relay.error(),
                origin = %origin,
                "pump no longer accepts events; unhandled dispatch failure abandoned"
            );
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, PumpQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventPump {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventPump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPump")
            .field("label", &self.config.label)
            .field("status", &self.status.load())
            .field("depth", &self.lock_queue().fifo.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HandlerError, HandlerFailure};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug)]
    struct Tick(u32);
    impl Event for Tick {}

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<u32> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Handler<Tick> for Recorder {
        async fn handle(&self, event: &Tick) -> Result<(), HandlerFailure> {
            self.seen.lock().unwrap().push(event.0);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
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

    /// Counts close requests; vetoes each one while `vetoes` > 0.
    struct CloseGate {
        requests: AtomicUsize,
        vetoes: AtomicUsize,
    }

    impl CloseGate {
        fn vetoing(count: usize) -> Self {
            Self {
                requests: AtomicUsize::new(0),
                vetoes: AtomicUsize::new(count),
            }
        }
    }

    #[async_trait]
    impl Handler<CloseRequest> for CloseGate {
        async fn handle(&self, event: &CloseRequest) -> Result<(), HandlerFailure> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self
                .vetoes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_ok()
            {
                event.veto();
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "close-gate"
        }
    }

    /// Records the labels of every lifecycle event it observes.
    #[derive(Default)]
    struct LifecycleProbe {
        order: Mutex<Vec<&'static str>>,
    }

    impl LifecycleProbe {
        fn order(&self) -> Vec<&'static str> {
            self.order.lock().unwrap().clone()
        }

        fn subscribe_all(probe: &Arc<Self>, pump: &EventPump) {
            pump.subscribe::<CloseRequest, _>(probe).unwrap();
            pump.subscribe::<Closing, _>(probe).unwrap();
            pump.subscribe::<Closed, _>(probe).unwrap();
        }
    }

    #[async_trait]
    impl Handler<CloseRequest> for LifecycleProbe {
        async fn handle(&self, _event: &CloseRequest) -> Result<(), HandlerFailure> {
            self.order.lock().unwrap().push("close-request");
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Closing> for LifecycleProbe {
        async fn handle(&self, _event: &Closing) -> Result<(), HandlerFailure> {
            self.order.lock().unwrap().push("closing");
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<Closed> for LifecycleProbe {
        async fn handle(&self, _event: &Closed) -> Result<(), HandlerFailure> {
            self.order.lock().unwrap().push("closed");
            Ok(())
        }
    }

    /// Records re-enqueued unhandled failures.
    #[derive(Default)]
    struct UnhandledProbe {
        seen: Mutex<Vec<(String, u32)>>,
    }

    #[async_trait]
    impl Handler<UnhandledException> for UnhandledProbe {
        async fn handle(&self, event: &UnhandledException) -> Result<(), HandlerFailure> {
            self.seen
                .lock()
                .unwrap()
                .push((event.error().as_label().to_string(), event.origin().line()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let pump = EventPump::new();
        let recorder = Arc::new(Recorder::default());
        pump.subscribe::<Tick, _>(&recorder).unwrap();

        for n in 0..10 {
            pump.enqueue(Tick(n)).unwrap();
        }
        assert!(pump.has_events());
        pump.handle_all().await;

        assert!(!pump.has_events());
        assert_eq!(recorder.seen(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dropped_handler_not_invoked_and_pruned() {
        let pump = EventPump::new();
        let recorder = Arc::new(Recorder::default());
        pump.subscribe::<Tick, _>(&recorder).unwrap();
        assert_eq!(pump.subscriber_count(), 1);

        drop(recorder);
        pump.enqueue(Tick(1)).unwrap();
        pump.handle_all().await;

        assert_eq!(pump.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_same_type_is_noop() {
        let pump = EventPump::new();
        let recorder = Arc::new(Recorder::default());
        pump.subscribe::<Tick, _>(&recorder).unwrap();
        pump.subscribe::<Tick, _>(&recorder).unwrap();

        pump.enqueue(Tick(1)).unwrap();
        pump.handle_all().await;

        assert_eq!(recorder.seen(), vec![1]);
        assert_eq!(pump.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_reports_whether_found() {
        let pump = EventPump::new();
        let recorder = Arc::new(Recorder::default());
        pump.subscribe::<Tick, _>(&recorder).unwrap();

        assert!(pump.unsubscribe::<Tick, _>(&recorder));
        assert!(!pump.unsubscribe::<Tick, _>(&recorder));

        pump.enqueue(Tick(1)).unwrap();
        pump.handle_all().await;
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn test_three_close_requests_deliver_one_event() {
        let pump = EventPump::new();
        let gate = Arc::new(CloseGate::vetoing(usize::MAX));
        pump.subscribe::<CloseRequest, _>(&gate).unwrap();

        pump.request_close();
        pump.request_close();
        pump.request_close();
        pump.handle_all().await;

        assert_eq!(gate.requests.load(Ordering::SeqCst), 1);

        // The veto released the latch: a later request goes through again.
        pump.request_close();
        pump.handle_all().await;
        assert_eq!(gate.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_veto_keeps_pump_open() {
        let pump = EventPump::new();
        let gate = Arc::new(CloseGate::vetoing(1));
        let recorder = Arc::new(Recorder::default());
        pump.subscribe::<CloseRequest, _>(&gate).unwrap();
        pump.subscribe::<Tick, _>(&recorder).unwrap();

        pump.request_close();
        pump.handle_all().await;

        assert_eq!(pump.status(), PumpStatus::Open);
        pump.enqueue(Tick(1)).unwrap();
        pump.handle_all().await;
        assert_eq!(recorder.seen(), vec![1]);
    }

    #[tokio::test]
    async fn test_unvetoed_close_request_runs_full_shutdown() {
        let pump = EventPump::new();
        let probe = Arc::new(LifecycleProbe::default());
        LifecycleProbe::subscribe_all(&probe, &pump);

        pump.request_close();
        pump.handle_all().await;

        assert_eq!(probe.order(), vec!["close-request", "closing", "closed"]);
        assert!(pump.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_ordering_and_post_close_rejections() {
        let pump = EventPump::new();
        let probe = Arc::new(LifecycleProbe::default());
        LifecycleProbe::subscribe_all(&probe, &pump);

        pump.begin_close();
        pump.begin_close(); // duplicate absorbed
        assert_eq!(pump.status(), PumpStatus::ClosingEnqueued);
        pump.handle_all().await;

        assert_eq!(probe.order(), vec!["closing", "closed"]);
        assert_eq!(pump.status(), PumpStatus::Closed);
        assert!(pump.is_closed());

        let err = pump.enqueue(Tick(1)).unwrap_err();
        assert_eq!(
            err,
            PumpError::EnqueueAfterClose {
                status: PumpStatus::Closed
            }
        );

        let late = Arc::new(Recorder::default());
        let err = pump.subscribe::<Tick, _>(&late).unwrap_err();
        assert_eq!(err.as_label(), "subscribe_after_close");
        assert_eq!(pump.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_begin_close_purges_queued_close_requests() {
        let pump = EventPump::new();
        let probe = Arc::new(LifecycleProbe::default());
        LifecycleProbe::subscribe_all(&probe, &pump);

        pump.request_close();
        pump.begin_close();
        pump.handle_all().await;

        // The queued CloseRequest was purged; only the closing pair ran.
        assert_eq!(probe.order(), vec!["closing", "closed"]);
    }

    #[tokio::test]
    async fn test_no_close_request_enqueued_after_begin_close() {
        let pump = EventPump::new();
        let probe = Arc::new(LifecycleProbe::default());
        LifecycleProbe::subscribe_all(&probe, &pump);

        pump.begin_close();
        pump.request_close(); // dropped: shutdown already in motion
        pump.handle_all().await;

        assert_eq!(probe.order(), vec!["closing", "closed"]);
    }

    #[tokio::test]
    async fn test_events_enqueued_while_closing_run_before_closed() {
        let pump = EventPump::new();
        let recorder = Arc::new(Recorder::default());
        let probe = Arc::new(LifecycleProbe::default());
        pump.subscribe::<Tick, _>(&recorder).unwrap();
        LifecycleProbe::subscribe_all(&probe, &pump);

        pump.begin_close();
        pump.enqueue(Tick(1)).unwrap(); // still accepted during ClosingEnqueued
        pump.handle_all().await;

        assert_eq!(recorder.seen(), vec![1]);
        assert_eq!(probe.order(), vec!["closing", "closed"]);
    }

    #[tokio::test]
    async fn test_two_failing_handlers_yield_ordered_aggregate() {
        let pump = EventPump::new();
        let first = Arc::new(Failing { tag: "first" });
        let second = Arc::new(Failing { tag: "second" });
        pump.subscribe::<Tick, _>(&first).unwrap();
        pump.subscribe::<Tick, _>(&second).unwrap();

        let receipt = pump.enqueue_and_wait(Tick(1)).unwrap();
        pump.handle_all().await;

        let error = receipt.await.unwrap_err();
        assert!(matches!(error, DispatchError::Aggregate { .. }));
        let names: Vec<&str> = error.failures().iter().map(HandlerError::handler).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_single_failure_reaches_waiter_unwrapped() {
        let pump = EventPump::new();
        let failing = Arc::new(Failing { tag: "boom" });
        pump.subscribe::<Tick, _>(&failing).unwrap();

        let receipt = pump.enqueue_and_wait(Tick(1)).unwrap();
        pump.handle_all().await;

        let error = receipt.await.unwrap_err();
        assert!(matches!(
            error,
            DispatchError::Handler(HandlerError::Failed { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_and_async_wait_observe_same_failure() {
        let pump = Arc::new(EventPump::new());
        let failing = Arc::new(Failing { tag: "boom" });
        pump.subscribe::<Tick, _>(&failing).unwrap();

        let async_receipt = pump.enqueue_and_wait(Tick(1)).unwrap();
        let blocking_receipt = pump.enqueue_and_wait(Tick(2)).unwrap();
        pump.handle_all().await;

        let async_error = async_receipt.await.unwrap_err();
        let blocking_error = tokio::task::spawn_blocking(move || blocking_receipt.wait())
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(async_error.as_label(), blocking_error.as_label());
        assert_eq!(
            async_error.failures()[0].handler(),
            blocking_error.failures()[0].handler()
        );
    }

    #[tokio::test]
    async fn test_unobserved_failure_reenqueued_with_provenance() {
        let pump = EventPump::new();
        let failing = Arc::new(Failing { tag: "boom" });
        let probe = Arc::new(UnhandledProbe::default());
        pump.subscribe::<Tick, _>(&failing).unwrap();
        pump.subscribe::<UnhandledException, _>(&probe).unwrap();

        let line = line!() + 1;
        pump.enqueue(Tick(1)).unwrap();
        pump.handle_all().await;

        let seen = probe.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("handler_failed".to_string(), line));
    }

    #[tokio::test]
    async fn test_dropped_receipt_routes_failure_to_unhandled() {
        let pump = EventPump::new();
        let failing = Arc::new(Failing { tag: "boom" });
        let probe = Arc::new(UnhandledProbe::default());
        pump.subscribe::<Tick, _>(&failing).unwrap();
        pump.subscribe::<UnhandledException, _>(&probe).unwrap();

        let receipt = pump.enqueue_and_wait(Tick(1)).unwrap();
        drop(receipt);
        pump.handle_all().await;

        assert_eq!(probe.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_in_unhandled_exception_dispatch_is_terminal() {
        struct FailingSink;

        #[async_trait]
        impl Handler<UnhandledException> for FailingSink {
            async fn handle(&self, _event: &UnhandledException) -> Result<(), HandlerFailure> {
                Err(HandlerFailure::new("sink down"))
            }
        }

        let pump = EventPump::new();
        let failing = Arc::new(Failing { tag: "boom" });
        let sink = Arc::new(FailingSink);
        pump.subscribe::<Tick, _>(&failing).unwrap();
        pump.subscribe::<UnhandledException, _>(&sink).unwrap();

        pump.enqueue(Tick(1)).unwrap();
        // Must terminate: the second-level failure is logged and abandoned,
        // never re-wrapped into another UnhandledException.
        timeout(Duration::from_secs(1), pump.handle_all())
            .await
            .expect("handle_all terminates");
        assert!(!pump.has_events());
    }

    #[tokio::test]
    async fn test_wait_for_event_wakes_on_enqueue() {
        let pump = Arc::new(EventPump::new());
        let waiter = {
            let pump = Arc::clone(&pump);
            tokio::spawn(async move { pump.wait_for_event().await })
        };
        tokio::task::yield_now().await;

        pump.enqueue(Tick(1)).unwrap();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_closed_releases_on_terminal_close() {
        let pump = Arc::new(EventPump::new());
        let waiter = {
            let pump = Arc::clone(&pump);
            tokio::spawn(async move { pump.wait_for_closed().await })
        };
        tokio::task::yield_now().await;

        pump.begin_close();
        pump.handle_all().await;

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .unwrap();
        // Permanently released: waiting again completes immediately.
        timeout(Duration::from_secs(1), pump.wait_for_closed())
            .await
            .expect("immediate");
    }

    #[tokio::test]
    async fn test_status_progression_is_enqueue_driven() {
        let pump = EventPump::new();
        assert_eq!(pump.status(), PumpStatus::Open);

        pump.request_close();
        assert_eq!(pump.status(), PumpStatus::Open); // CloseRequest moves nothing

        pump.begin_close();
        assert_eq!(pump.status(), PumpStatus::ClosingEnqueued);

        pump.handle_one().await; // dispatch Closing → enqueues Closed
        assert_eq!(pump.status(), PumpStatus::ClosedEnqueued);

        pump.handle_one().await; // dispatch Closed → terminal
        assert_eq!(pump.status(), PumpStatus::Closed);
    }

    #[tokio::test]
    async fn test_hand_enqueued_closed_is_absorbed_while_open() {
        let pump = EventPump::new();
        pump.enqueue(Closed).unwrap();

        assert_eq!(pump.status(), PumpStatus::Open);
        assert!(!pump.has_events());
    }
}
