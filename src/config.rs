//! # Pump configuration.
//!
//! [`PumpConfig`] defines per-pump diagnostics knobs: the label attached
//! to every log line the pump emits, and the queue depth at which a
//! warning is logged.
//!
//! # Example
//! ```
//! use eventide::PumpConfig;
//!
//! let mut cfg = PumpConfig::named("ui");
//! cfg.high_watermark = 256;
//!
//! assert_eq!(&*cfg.label, "ui");
//! ```

use std::sync::Arc;

/// Configuration for one [`EventPump`](crate::EventPump).
///
/// The queue itself is unbounded; `high_watermark` does not drop events,
/// it marks the depth at which the pump logs a warning so a stalled or
/// missing consumer is visible before memory becomes a problem.
#[derive(Clone, Debug)]
pub struct PumpConfig {
    /// Label used in log lines emitted by this pump.
    pub label: Arc<str>,
    /// Queue depth at which a warning is logged (0 = never warn).
    pub high_watermark: usize,
}

impl Default for PumpConfig {
    /// Provides a default configuration:
    /// - `label = "pump"`
    /// - `high_watermark = 1024`
    fn default() -> Self {
        Self {
            label: "pump".into(),
            high_watermark: 1024,
        }
    }
}

impl PumpConfig {
    /// Creates a configuration with the given label and default knobs.
    pub fn named(label: impl Into<Arc<str>>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}
