//! Pump core: the FIFO queue, lifecycle state machine, and dispatch drive.
//!
//! ## Architecture
//! ```text
//! Producers (any task/thread):
//!   enqueue(e) ──┐
//!   enqueue_and_wait(e) ──► DispatchReceipt (await | blocking wait)
//!   request_close() / begin_close()
//!                │
//!                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ EventPump                                                    │
//! │   FIFO VecDeque<QueuedEvent>  (mutex)                        │
//! │   PumpStatus: Open → ClosingEnqueued → ClosedEnqueued →      │
//! │               Closed            (atomic CAS, forward only)   │
//! │   events-available watch signal · closed CancellationToken   │
//! └──────┬───────────────────────────────────────────────────────┘
//!        │ handle_one() / handle_all()        (single consumer at
//!        ▼                                     a time, see registry)
//!   SubscriptionRegistry::invoke_handlers()
//!        │
//!        ├─ completion signal present  → resolve the receipt
//!        └─ nobody listening + failure → re-enqueue UnhandledException
//!                                         (one level; then tracing::error!)
//! ```
//!
//! Internal modules:
//! - [`status`]: the four-state lifecycle and its atomic cell;
//! - [`envelope`]: the enqueued-event wrapper and the dispatch receipt;
//! - [`pump`]: the queue, close protocol, and dispatch primitives;
//! - [`worker`]: the dedicated dispatch loop that makes a pump autonomous;
//! - [`signal`]: OS termination signals turned into close requests.

mod envelope;
mod pump;
mod signal;
mod status;
mod worker;

pub use envelope::DispatchReceipt;
pub use pump::EventPump;
pub use signal::{request_close_on_signal, wait_for_close_signal};
pub use status::PumpStatus;
pub use worker::PumpWorker;
