//! # Enqueued-event wrapper and dispatch receipt.
//!
//! [`QueuedEvent`] is what actually sits in the FIFO: the event, the
//! provenance stamped at the enqueue call, and — for the waiting enqueue
//! variant — a completion signal. Exactly one wrapper exists per enqueue
//! call; it is consumed once its handlers have run and the signal is
//! resolved.
//!
//! [`DispatchReceipt`] is the caller-side end of the completion signal:
//! a future resolving with the dispatch outcome, plus a blocking wait for
//! producers living on plain threads.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::DispatchError;
use crate::events::{EnqueueSource, Event};

pub(crate) type DispatchOutcome = Result<(), DispatchError>;

/// One enqueued event: payload, provenance, optional completion signal.
#[derive(Debug)]
pub(crate) struct QueuedEvent {
    pub(crate) event: Arc<dyn Event>,
    pub(crate) source: EnqueueSource,
    completion: Option<oneshot::Sender<DispatchOutcome>>,
}

impl QueuedEvent {
    pub(crate) fn new(event: Arc<dyn Event>, source: EnqueueSource) -> Self {
        Self {
            event,
            source,
            completion: None,
        }
    }

    /// Creates a wrapper carrying a completion signal, plus the receipt
    /// that resolves when the wrapper is settled.
    pub(crate) fn with_receipt(
        event: Arc<dyn Event>,
        source: EnqueueSource,
    ) -> (Self, DispatchReceipt) {
        let (tx, rx) = oneshot::channel();
        let queued = Self {
            event,
            source,
            completion: Some(tx),
        };
        (queued, DispatchReceipt { rx })
    }

    /// Resolves the completion signal with the dispatch outcome.
    ///
    /// Returns the outcome back when nobody was listening — no signal was
    /// attached, or the receipt was dropped — so the caller can escalate
    /// an unobserved failure.
    pub(crate) fn resolve(&mut self, outcome: DispatchOutcome) -> Option<DispatchOutcome> {
        match self.completion.take() {
            Some(tx) => tx.send(outcome).err(),
            None => Some(outcome),
        }
    }
}

/// Completion handle for one waiting enqueue.
///
/// Await it on a task, or call [`wait`](DispatchReceipt::wait) from a
/// plain thread. Either way it resolves once the event's handlers have
/// finished, with the collected handler failure if any. Dropping the
/// receipt is allowed: an unobserved failure is then re-enqueued as an
/// [`UnhandledException`](crate::UnhandledException) event.
#[derive(Debug)]
pub struct DispatchReceipt {
    rx: oneshot::Receiver<DispatchOutcome>,
}

impl DispatchReceipt {
    /// Blocks the calling thread until dispatch finishes.
    ///
    /// Must not be called from an async context; use `.await` there.
    pub fn wait(self) -> DispatchOutcome {
        match self.rx.blocking_recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(DispatchError::Abandoned),
        }
    }
}

impl Future for DispatchReceipt {
    type Output = DispatchOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;
    impl Event for Ping {}

    #[tokio::test]
    async fn test_receipt_resolves_with_outcome() {
        let (mut queued, receipt) =
            QueuedEvent::with_receipt(Arc::new(Ping), EnqueueSource::capture());
        assert!(queued.resolve(Ok(())).is_none());
        assert!(receipt.await.is_ok());
    }

    #[test]
    fn test_resolve_without_listener_returns_outcome() {
        let mut queued = QueuedEvent::new(Arc::new(Ping), EnqueueSource::capture());
        assert!(queued.resolve(Ok(())).is_some());

        let (mut queued, receipt) =
            QueuedEvent::with_receipt(Arc::new(Ping), EnqueueSource::capture());
        drop(receipt);
        assert!(queued.resolve(Ok(())).is_some());
    }

    #[tokio::test]
    async fn test_dropped_wrapper_abandons_receipt() {
        let (queued, receipt) = QueuedEvent::with_receipt(Arc::new(Ping), EnqueueSource::capture());
        drop(queued);
        assert!(matches!(receipt.await, Err(DispatchError::Abandoned)));
    }
}
