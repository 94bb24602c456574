//! Composition root for applications embedding the dispatch engine.
//!
//! The [`Host`] owns the one [`Dispatcher`](cinder_dispatch::Dispatcher)
//! instance, hands shared references to whoever posts or subscribes, and
//! drives the pump on a fixed cadence.

pub mod host;

pub use host::Host;
