//! # Event handler trait.
//!
//! Provides [`Handler`] — the capability implemented by subscriber code,
//! parameterized by the concrete event type it wants to observe.
//!
//! ## Rules
//! - Handlers for one pump never run concurrently with each other; one
//!   dispatch batch runs at a time.
//! - Within one dispatched event, handlers run in registration order.
//! - A returned failure or a panic is caught per handler; siblings still
//!   run, and the collected outcome routes to whoever awaits the dispatch.
//! - One type may implement `Handler<E>` for several `E`; subscribe it
//!   once per event type.
//!
//! ## Example
//! ```
//! use async_trait::async_trait;
//! use eventide::{Handler, HandlerFailure};
//!
//! #[derive(Debug)]
//! struct DocumentSaved {
//!     path: String,
//! }
//! impl eventide::Event for DocumentSaved {}
//!
//! struct RecentFiles;
//!
//! #[async_trait]
//! impl Handler<DocumentSaved> for RecentFiles {
//!     async fn handle(&self, event: &DocumentSaved) -> Result<(), HandlerFailure> {
//!         if event.path.is_empty() {
//!             return Err(HandlerFailure::new("empty path"));
//!         }
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "recent-files"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::HandlerFailure;
use crate::events::Event;

/// Subscriber capability for one concrete event type.
///
/// Implementations must be cheap to share (`Send + Sync`); the pump holds
/// them weakly and upgrades to a temporary strong reference only for the
/// duration of a dispatch.
#[async_trait]
pub trait Handler<E: Event>: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from whichever task is pumping the queue (the dedicated
    /// worker, or a caller of `handle_one`/`handle_all`), never from the
    /// producer's enqueue call. Return a [`HandlerFailure`] for expected
    /// failures; panics are caught and reported the same way.
    async fn handle(&self, event: &E) -> Result<(), HandlerFailure>;

    /// Returns the handler name used in logs and error reports.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose —
    /// override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
