//! # Event subscribers.
//!
//! This module provides the [`Handler`] trait, the weak subscription
//! registry behind every pump, and the built-in [`LogWriter`] sink.
//!
//! ## Architecture
//! ```text
//! Dispatch flow (one event):
//!   EventPump::handle_one()
//!        │
//!        ▼
//!   SubscriptionRegistry::invoke_handlers()      ◄── exclusive: one dispatch
//!        │  resolve targets by concrete type          batch system-wide
//!        │  (upgrade weak refs, prune dead)
//!        │
//!        ├──► handler1.handle(&event)   ── Err/panic caught, collected
//!        ├──► handler2.handle(&event)   ── siblings unaffected
//!        └──► handlerN.handle(&event)
//!                      │
//!                      ▼
//!        None / single HandlerError / Aggregate (registration order)
//! ```
//!
//! ## Subscription lifetime
//! The registry holds handlers **weakly**: subscribing never keeps a
//! handler alive. Keep the `Arc` you subscribed for as long as the
//! handler should receive events; entries whose handler is gone are
//! pruned lazily during lookup and mutation passes.

mod handler;
mod log;
mod registry;

pub use handler::Handler;
pub use log::LogWriter;

pub(crate) use registry::SubscriptionRegistry;
