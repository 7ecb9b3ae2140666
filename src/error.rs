//! Error types used by the event pump and its subscribers.
//!
//! This module defines the failure taxonomy of the crate:
//!
//! - [`PumpError`] — contract violations surfaced to the caller at the
//!   enqueue/subscribe boundary (queue already closed, shutdown begun).
//! - [`HandlerFailure`] — the structured failure a handler returns from
//!   [`Handler::handle`](crate::Handler::handle): a message plus an ordered
//!   diagnostic map.
//! - [`HandlerError`] — one handler's outcome as seen by the pump, tagged
//!   with the handler name (returned failure or caught panic).
//! - [`DispatchError`] — what a waiting caller observes for one dispatched
//!   event: a single handler error, or an aggregate of several stamped with
//!   the event's enqueue provenance.
//!
//! All types provide `as_label()` for short stable snake_case labels in
//! logs/metrics; the enums also provide `as_message()` with details.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::core::PumpStatus;
use crate::events::EnqueueSource;

/// # Errors raised by the pump at the enqueue/subscribe boundary.
///
/// These are contract violations reported immediately to the caller; they
/// never originate from handler code. Re-entrant shutdown races are *not*
/// errors — duplicate close calls are absorbed silently.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpError {
    /// An event was enqueued after `Closed` was already enqueued;
    /// nothing may follow `Closed`.
    #[error("event rejected: pump status is {status}, no event may follow Closed")]
    EnqueueAfterClose {
        /// Pump status observed at the rejected call.
        status: PumpStatus,
    },

    /// A subscription was attempted once shutdown had begun. Refusing new
    /// subscriptions past this point guarantees no handler ever observes
    /// `Closed` without a preceding `Closing`.
    #[error("subscription rejected: pump status is {status}, shutdown has begun")]
    SubscribeAfterClose {
        /// Pump status observed at the rejected call.
        status: PumpStatus,
    },
}

impl PumpError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventide::{PumpError, PumpStatus};
    ///
    /// let err = PumpError::EnqueueAfterClose { status: PumpStatus::Closed };
    /// assert_eq!(err.as_label(), "enqueue_after_close");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PumpError::EnqueueAfterClose { .. } => "enqueue_after_close",
            PumpError::SubscribeAfterClose { .. } => "subscribe_after_close",
        }
    }

    /// Returns the pump status observed when the call was rejected.
    pub fn status(&self) -> PumpStatus {
        match self {
            PumpError::EnqueueAfterClose { status } => *status,
            PumpError::SubscribeAfterClose { status } => *status,
        }
    }
}

/// Structured failure returned by a handler.
///
/// Carries a human-readable message and an ordered key/value diagnostic
/// map for context that should travel with the failure (ids, paths,
/// attempted values).
///
/// # Example
/// ```
/// use eventide::HandlerFailure;
///
/// let failure = HandlerFailure::new("settings file unreadable")
///     .with_detail("path", "/etc/app/settings.toml");
/// assert_eq!(failure.message(), "settings file unreadable");
/// assert_eq!(failure.detail("path"), Some("/etc/app/settings.toml"));
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerFailure {
    message: String,
    details: BTreeMap<String, String>,
}

impl HandlerFailure {
    /// Creates a failure with the given message and no details.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attaches one diagnostic key/value pair.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns one diagnostic value by key.
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    /// Returns the full diagnostic map, ordered by key.
    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }
}

/// # One handler's outcome for one dispatched event.
///
/// Produced by the dispatch path: either the handler returned a
/// [`HandlerFailure`], or it panicked and the panic was caught. Sibling
/// handlers are unaffected in both cases.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler returned a failure.
    #[error("handler '{handler}' failed: {failure}")]
    Failed {
        /// Name of the failing handler.
        handler: Arc<str>,
        /// The failure it returned.
        failure: HandlerFailure,
    },

    /// The handler panicked; the payload was caught and stringified.
    #[error("handler '{handler}' panicked: {message}")]
    Panicked {
        /// Name of the panicking handler.
        handler: Arc<str>,
        /// Panic payload rendered as text.
        message: String,
    },
}

impl HandlerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Failed { .. } => "handler_failed",
            HandlerError::Panicked { .. } => "handler_panicked",
        }
    }

    /// Returns the name of the handler this outcome belongs to.
    pub fn handler(&self) -> &str {
        match self {
            HandlerError::Failed { handler, .. } => handler,
            HandlerError::Panicked { handler, .. } => handler,
        }
    }
}

/// # Failure of one event's dispatch, as observed by a waiting caller.
///
/// Resolved into the [`DispatchReceipt`](crate::DispatchReceipt) of the
/// waiting enqueue variants; for fire-and-forget enqueues it is re-enqueued
/// as an [`UnhandledException`](crate::UnhandledException) event instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Exactly one handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Several handlers failed; the aggregate carries the failures in
    /// handler-registration order and the event's enqueue provenance.
    #[error("{count} handlers failed for event enqueued at {source}", count = .failures.len())]
    Aggregate {
        /// Where the failing event was enqueued.
        source: EnqueueSource,
        /// Per-handler failures, in registration order.
        failures: Vec<HandlerError>,
    },

    /// The pump was dropped before the event was dispatched; its receipt
    /// can never resolve normally.
    #[error("event abandoned before dispatch")]
    Abandoned,
}

impl DispatchError {
    /// Folds collected handler errors into a dispatch outcome:
    /// `None` when empty, the single error when one, an aggregate otherwise.
    pub(crate) fn from_failures(
        source: EnqueueSource,
        mut failures: Vec<HandlerError>,
    ) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => Some(failures.remove(0).into()),
            _ => Some(DispatchError::Aggregate { source, failures }),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Handler(e) => e.as_label(),
            DispatchError::Aggregate { .. } => "dispatch_aggregate",
            DispatchError::Abandoned => "dispatch_abandoned",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::Handler(e) => e.to_string(),
            DispatchError::Aggregate { source, failures } => {
                let names: Vec<&str> = failures.iter().map(HandlerError::handler).collect();
                format!(
                    "{} handlers failed ({}) for event enqueued at {source}",
                    failures.len(),
                    names.join(", ")
                )
            }
            DispatchError::Abandoned => "event abandoned before dispatch".to_string(),
        }
    }

    /// Returns the per-handler failures behind this error, in
    /// handler-registration order. Empty for [`DispatchError::Abandoned`].
    pub fn failures(&self) -> &[HandlerError] {
        match self {
            DispatchError::Handler(e) => std::slice::from_ref(e),
            DispatchError::Aggregate { failures, .. } => failures,
            DispatchError::Abandoned => &[],
        }
    }
}
