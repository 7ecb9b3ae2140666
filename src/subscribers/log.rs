//! # Built-in logging sink.
//!
//! [`LogWriter`] forwards the pump's lifecycle and failure events to the
//! `tracing` subscriber of the host application:
//!
//! ```text
//! [ERROR] unhandled dispatch failure  error=... origin=src/ui.rs:42:9
//! [DEBUG] close requested
//! [INFO]  pump closing
//! [INFO]  pump closed
//! ```
//!
//! Install it explicitly; like every subscription, the registry holds it
//! weakly, so keep the returned `Arc` alive for as long as logging should
//! continue:
//!
//! ```
//! use eventide::{EventPump, LogWriter};
//!
//! let pump = EventPump::new();
//! let _log = LogWriter::install(&pump).expect("pump still open");
//! ```

use async_trait::async_trait;

use crate::core::EventPump;
use crate::error::{HandlerFailure, PumpError};
use crate::events::{CloseRequest, Closed, Closing, UnhandledException};

use super::Handler;

/// Logging sink for lifecycle and failure events.
///
/// `UnhandledException` is logged at error level — it is the last stop for
/// dispatch failures nobody awaited. Lifecycle events log at debug/info.
pub struct LogWriter;

impl LogWriter {
    /// Subscribes a new `LogWriter` to the given pump for
    /// `UnhandledException` and the lifecycle events.
    ///
    /// The caller must hold the returned `Arc`; dropping it detaches the
    /// sink (subscriptions are weak).
    pub fn install(pump: &EventPump) -> Result<std::sync::Arc<Self>, PumpError> {
        let writer = std::sync::Arc::new(LogWriter);
        pump.subscribe::<UnhandledException, _>(&writer)?;
        pump.subscribe::<CloseRequest, _>(&writer)?;
        pump.subscribe::<Closing, _>(&writer)?;
        pump.subscribe::<Closed, _>(&writer)?;
        Ok(writer)
    }
}

#[async_trait]
impl Handler<UnhandledException> for LogWriter {
    async fn handle(&self, event: &UnhandledException) -> Result<(), HandlerFailure> {
        tracing::error!(
            error = %event.error(),
            origin = %event.origin(),
            "unhandled dispatch failure"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

#[async_trait]
impl Handler<CloseRequest> for LogWriter {
    async fn handle(&self, event: &CloseRequest) -> Result<(), HandlerFailure> {
        tracing::debug!(can_begin_close = event.can_begin_close(), "close requested");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

#[async_trait]
impl Handler<Closing> for LogWriter {
    async fn handle(&self, _event: &Closing) -> Result<(), HandlerFailure> {
        tracing::info!("pump closing");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

#[async_trait]
impl Handler<Closed> for LogWriter {
    async fn handle(&self, _event: &Closed) -> Result<(), HandlerFailure> {
        tracing::info!("pump closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
