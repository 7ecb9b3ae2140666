//! # Built-in lifecycle events.
//!
//! Four event types have queue-internal semantics; everything else on a
//! pump is application-defined:
//!
//! - [`CloseRequest`] — asks subscribers whether shutdown may begin; any
//!   handler can veto it while it is being handled.
//! - [`Closing`] — "stop accepting new subscriptions; release resources
//!   now". Its enqueue moves the pump to `ClosingEnqueued`.
//! - [`Closed`] — terminal event, always the last one dispatched. Its
//!   enqueue moves the pump to `ClosedEnqueued`; its dispatch completes
//!   the shutdown.
//! - [`UnhandledException`] — wraps a dispatch failure nobody was waiting
//!   for, re-enqueued so the failure stays observable.
//!
//! ## Shutdown flow
//! ```text
//! request_close()          begin_close()              (internal)
//!   CloseRequest ──veto?──►  Closing ───────────────►  Closed
//!        │ no veto: begin_close()  │ handlers done:      │ handlers done:
//!        │                         │ enqueue Closed      │ status = Closed,
//!        ▼                         ▼                     ▼ registry cleared
//!   pump stays Open          ClosingEnqueued        ClosedEnqueued → Closed
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DispatchError;

use super::event::{EnqueueSource, Event};

/// Asks subscribers whether application shutdown may begin.
///
/// Delivered to handlers before any resource is released. A handler that
/// needs to keep the application alive (unsaved work, running job) calls
/// [`veto`](CloseRequest::veto); once all handlers have run, the pump
/// begins closing only if the flag is still set.
///
/// The flag is atomic so handlers veto through the shared event reference.
#[derive(Debug)]
pub struct CloseRequest {
    can_begin_close: AtomicBool,
}

impl CloseRequest {
    /// Creates a close request with the veto flag clear (close allowed).
    pub fn new() -> Self {
        Self {
            can_begin_close: AtomicBool::new(true),
        }
    }

    /// Vetoes the close: the pump will stay open after this request.
    pub fn veto(&self) {
        self.can_begin_close.store(false, Ordering::Release);
    }

    /// Withdraws a veto, allowing the close to proceed.
    pub fn allow(&self) {
        self.can_begin_close.store(true, Ordering::Release);
    }

    /// Returns whether the close may currently proceed.
    pub fn can_begin_close(&self) -> bool {
        self.can_begin_close.load(Ordering::Acquire)
    }
}

impl Default for CloseRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl Event for CloseRequest {
    fn label(&self) -> &'static str {
        "close-request"
    }
}

/// Signals that shutdown is underway: no new subscriptions are accepted,
/// subscribers should release resources now.
#[derive(Debug, Default)]
pub struct Closing;

impl Event for Closing {
    fn label(&self) -> &'static str {
        "closing"
    }
}

/// Terminal event; always the last one a pump dispatches.
#[derive(Debug, Default)]
pub struct Closed;

impl Event for Closed {
    fn label(&self) -> &'static str {
        "closed"
    }
}

/// Wraps a dispatch failure that no caller was waiting for.
///
/// Re-enqueued by the pump so every failure is observable somewhere:
/// subscribe a handler for this type (for example
/// [`LogWriter`](crate::LogWriter)) to receive them.
#[derive(Debug)]
pub struct UnhandledException {
    error: DispatchError,
    origin: EnqueueSource,
}

impl UnhandledException {
    pub(crate) fn new(error: DispatchError, origin: EnqueueSource) -> Self {
        Self { error, origin }
    }

    /// Returns the dispatch failure being reported.
    pub fn error(&self) -> &DispatchError {
        &self.error
    }

    /// Returns where the event whose dispatch failed was enqueued.
    pub fn origin(&self) -> EnqueueSource {
        self.origin
    }
}

impl Event for UnhandledException {
    fn label(&self) -> &'static str {
        "unhandled-exception"
    }
}
