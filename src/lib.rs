//! # eventide
//!
//! An in-process event coordination core: a thread-safe FIFO event queue
//! that accepts events from arbitrary producers, dispatches them to typed
//! subscribers one at a time, and walks a cooperative multi-phase
//! shutdown protocol that lets subscribers veto or react to termination
//! before resources are released.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Producers (any task / any thread)
//!     enqueue(e) · enqueue_and_wait(e) · request_close()
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ EventPump                                               │
//! │  - FIFO queue of enqueued events (+ provenance stamp)   │
//! │  - PumpStatus state machine (Open → … → Closed)         │
//! │  - SubscriptionRegistry (weak, typed, dispatch-excl.)   │
//! └───────┬─────────────────────────────────────────────────┘
//!         │ handle_one()/handle_all()   — or autonomously:
//!         ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ PumpWorker: loop { wait_for_event; handle_all }         │
//! └───────┬─────────────────────────────────────────────────┘
//!         ▼
//!   Handler<E>::handle(&E)   (registration order, fault-isolated)
//!         │
//!         ├─ waiting caller → DispatchReceipt resolves
//!         └─ nobody waiting + failure → UnhandledException event
//! ```
//!
//! ### Shutdown protocol
//! ```text
//! request_close() ─► CloseRequest dispatched ─► vetoed? ──► stays Open
//!                                              │ no
//!                                              ▼
//! begin_close() ──► Closing dispatched ──► Closed dispatched ──► terminal:
//!   (purges moot        (enqueues Closed)     registry cleared,
//!    CloseRequests)                           wait_for_closed released
//! ```
//!
//! ## Core types
//! | Type | Description |
//! |------|-------------|
//! | [`Event`] | Capability implemented by everything that can be enqueued |
//! | [`Handler`] | Typed subscriber capability (`Handler<E>`) |
//! | [`EventPump`] | The queue + state machine; manually pumped |
//! | [`PumpWorker`] | Background task that pumps autonomously |
//! | [`DispatchReceipt`] | Completion handle: `.await` or blocking `wait()` |
//! | [`EnqueueSource`] | Source location stamped at the enqueue call |
//! | [`CloseRequest`], [`Closing`], [`Closed`] | Built-in shutdown events |
//! | [`UnhandledException`] | Re-enqueued unobserved dispatch failure |
//! | [`LogWriter`] | Built-in `tracing` sink for failures and lifecycle |
//!
//! ## Guarantees
//! - **FIFO**: dispatch order is enqueue order; one event is fully
//!   dispatched (all matching handlers run) before the next is dequeued.
//! - **Fault isolation**: a failing or panicking handler never aborts its
//!   siblings or the pump; the collected outcome goes to whoever awaits
//!   the dispatch, or is re-enqueued as [`UnhandledException`].
//! - **Weak subscriptions**: the registry never keeps a handler alive;
//!   drop the `Arc` (or `unsubscribe`) to detach.
//! - **Monotonic shutdown**: status only moves forward; duplicate close
//!   calls are absorbed, races resolve to exactly one winner.
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use eventide::{Handler, HandlerFailure, PumpWorker};
//!
//! #[derive(Debug)]
//! struct JobFinished {
//!     id: u64,
//! }
//! impl eventide::Event for JobFinished {}
//!
//! struct Notifier;
//!
//! #[async_trait]
//! impl Handler<JobFinished> for Notifier {
//!     async fn handle(&self, event: &JobFinished) -> Result<(), HandlerFailure> {
//!         println!("job {} finished", event.id);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let worker = PumpWorker::spawn();
//!
//!     let notifier = Arc::new(Notifier);
//!     worker.subscribe::<JobFinished, _>(&notifier).expect("pump open");
//!
//!     // Fire-and-forget, or wait for the handlers to run:
//!     worker.enqueue(JobFinished { id: 1 }).expect("pump open");
//!     worker
//!         .enqueue_and_wait(JobFinished { id: 2 })
//!         .expect("pump open")
//!         .await
//!         .expect("handlers succeeded");
//!
//!     // Cooperative shutdown: subscribers could veto the request.
//!     worker.request_close();
//!     worker.join().await;
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod subscribers;

pub use config::PumpConfig;
pub use core::{
    request_close_on_signal, wait_for_close_signal, DispatchReceipt, EventPump, PumpStatus,
    PumpWorker,
};
pub use error::{DispatchError, HandlerError, HandlerFailure, PumpError};
pub use events::{CloseRequest, Closed, Closing, EnqueueSource, Event, UnhandledException};
pub use subscribers::{Handler, LogWriter};
