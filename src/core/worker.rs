//! # Dedicated dispatch worker.
//!
//! [`PumpWorker`] turns a passive [`EventPump`] into an autonomous queue:
//! one background task loops *wait for an event → dispatch everything
//! queued → repeat*, stopping only once the pump is closed. Producers
//! just enqueue; handlers always run on the worker task, never on the
//! producer's.
//!
//! ## Architecture
//! ```text
//! Producers ──► PumpWorker (delegates the full pump surface)
//!                  │ owns Arc<EventPump> + spawned drive task
//!                  ▼
//!            loop {
//!              pump.wait_for_event().await;
//!              pump.handle_all().await;
//!            } until pump.is_closed()
//! ```
//!
//! The drive task exits on its own after `Closed` is dispatched;
//! [`join`](PumpWorker::join) awaits that. Dropping the worker without
//! closing leaves the task running until the runtime shuts down.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::PumpConfig;
use crate::error::PumpError;
use crate::events::Event;
use crate::subscribers::Handler;

use super::envelope::DispatchReceipt;
use super::pump::EventPump;
use super::status::PumpStatus;

/// An [`EventPump`] driven by a dedicated background task.
///
/// Exposes the same surface as the pump by delegation, so callers cannot
/// tell whether dispatch happens inline or on the worker.
#[must_use = "dropping the worker detaches its drive task; call join() after closing"]
pub struct PumpWorker {
    pump: Arc<EventPump>,
    driver: JoinHandle<()>,
}

impl PumpWorker {
    /// Spawns a worker around a new pump with the default configuration.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn() -> Self {
        Self::with_config(PumpConfig::default())
    }

    /// Spawns a worker around a new pump with the given configuration.
    pub fn with_config(config: PumpConfig) -> Self {
        let pump = Arc::new(EventPump::with_config(config));
        let driver = tokio::spawn(Self::drive(Arc::clone(&pump)));
        Self { pump, driver }
    }

    async fn drive(pump: Arc<EventPump>) {
        while !pump.is_closed() {
            pump.wait_for_event().await;
            pump.handle_all().await;
        }
        tracing::debug!(pump = pump.label(), "pump worker stopped");
    }

    /// The shared pump, for handing to producers directly.
    pub fn pump(&self) -> &Arc<EventPump> {
        &self.pump
    }

    /// See [`EventPump::subscribe`].
    pub fn subscribe<E, H>(&self, handler: &Arc<H>) -> Result<(), PumpError>
    where
        E: Event,
        H: Handler<E>,
    {
        self.pump.subscribe::<E, H>(handler)
    }

    /// See [`EventPump::unsubscribe`].
    pub fn unsubscribe<E, H>(&self, handler: &Arc<H>) -> bool
    where
        E: Event,
        H: Handler<E>,
    {
        self.pump.unsubscribe::<E, H>(handler)
    }

    /// See [`EventPump::enqueue`].
    #[track_caller]
    pub fn enqueue<E: Event>(&self, event: E) -> Result<(), PumpError> {
        self.pump.enqueue(event)
    }

    /// See [`EventPump::enqueue_and_wait`].
    #[track_caller]
    pub fn enqueue_and_wait<E: Event>(&self, event: E) -> Result<DispatchReceipt, PumpError> {
        self.pump.enqueue_and_wait(event)
    }

    /// See [`EventPump::request_close`].
    #[track_caller]
    pub fn request_close(&self) {
        self.pump.request_close();
    }

    /// See [`EventPump::begin_close`].
    #[track_caller]
    pub fn begin_close(&self) {
        self.pump.begin_close();
    }

    /// See [`EventPump::has_events`].
    pub fn has_events(&self) -> bool {
        self.pump.has_events()
    }

    /// See [`EventPump::is_closed`].
    pub fn is_closed(&self) -> bool {
        self.pump.is_closed()
    }

    /// See [`EventPump::status`].
    pub fn status(&self) -> PumpStatus {
        self.pump.status()
    }

    /// See [`EventPump::wait_for_closed`].
    pub async fn wait_for_closed(&self) {
        self.pump.wait_for_closed().await;
    }

    /// Waits for the pump to close and the drive task to finish.
    pub async fn join(self) {
        self.pump.wait_for_closed().await;
        let _ = self.driver.await;
    }
}
