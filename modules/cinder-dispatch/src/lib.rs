//! Callback and call-result dispatch engine.
//!
//! Producers hand the [`Dispatcher`] opaque payloads: repeatable events keyed
//! by [`EventKind`], or one-shot call results keyed by a [`CallHandle`] the
//! dispatcher mints. Consumers register [`Subscriber`]s. Nothing is delivered
//! until the embedding application calls [`Dispatcher::pump`], which runs
//! subscriber code without holding any internal lock.
//!
//! The engine knows nothing about what the payload bytes mean.

pub mod dispatcher;
pub mod error;
pub mod queue;
mod registry;
pub mod subscriber;
pub mod types;

pub use dispatcher::{DispatchStats, Dispatcher, PumpReport};
pub use error::DispatchError;
pub use queue::{EventQueue, QueuedEntry};
pub use subscriber::{Callback, Delivery, Registration, Subscriber, SubscriberId};
pub use types::{CallHandle, EventKind, Payload, Scope};
