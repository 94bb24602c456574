//! The dispatcher: registration, posting, and the pump.
//!
//! One lock guards both callback scopes, the call-result map, and the pending
//! queue. It is only ever held long enough to copy what a delivery needs; no
//! subscriber code runs while it is held. Call handles come from an atomic
//! counter outside the lock.

use std::ops::AddAssign;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cinder_common::{CallResultRetention, DispatchConfig};
use tracing::{debug, error, warn};

use crate::error::DispatchError;
use crate::queue::{EventQueue, QueuedEntry};
use crate::registry::{CallResultRegistry, CallbackRegistry};
use crate::subscriber::{Delivery, Subscriber};
use crate::types::{CallHandle, EventKind, Payload, Scope};

#[derive(Default)]
struct Shared {
    callbacks: CallbackRegistry,
    call_results: CallResultRegistry,
    pending: EventQueue,
}

/// Outcome of a single [`Dispatcher::pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Subscriber invocations that returned normally.
    pub delivered: usize,
    /// Entries dropped because nobody was listening.
    pub orphaned: usize,
    /// Subscriber invocations that panicked (only counted when panics are caught).
    pub panicked: usize,
}

impl AddAssign for PumpReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.orphaned += other.orphaned;
        self.panicked += other.panicked;
    }
}

/// Lifetime counters, see [`Dispatcher::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events_posted: u64,
    pub call_results_posted: u64,
    pub delivered: u64,
    pub orphaned: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    events_posted: AtomicU64,
    call_results_posted: AtomicU64,
    delivered: AtomicU64,
    orphaned: AtomicU64,
    panicked: AtomicU64,
}

/// Callback and call-result dispatch engine.
///
/// Producers post payloads; the embedding application calls [`pump`] on its
/// own cadence to deliver them. Owned by whatever composes the application
/// and shared by `Arc`.
///
/// [`pump`]: Dispatcher::pump
pub struct Dispatcher {
    shared: Mutex<Shared>,
    next_handle: AtomicU64,
    counters: Counters,
    config: DispatchConfig,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            shared: Mutex::new(Shared::default()),
            next_handle: AtomicU64::new(CallHandle::INVALID.0 + 1),
            counters: Counters::default(),
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    // The guarded state is never left half-updated (subscriber code never runs
    // under the lock), so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Start delivering events of `kind` posted to `scope` to `subscriber`.
    /// Returns false (and logs) if the subscriber is already registered.
    pub fn register_callback(
        &self,
        subscriber: &Arc<Subscriber>,
        kind: EventKind,
        scope: Scope,
    ) -> bool {
        let result = self.lock().callbacks.register(subscriber, kind, scope);
        match result {
            Ok(()) => {
                debug!(subscriber = %subscriber.id(), %kind, %scope, "Callback registered");
                true
            }
            Err(err) => {
                warn!(%err, %kind, %scope, "Callback registration ignored");
                false
            }
        }
    }

    /// Stop delivering events to `subscriber` under whatever kind it holds.
    pub fn unregister_callback(&self, subscriber: &Arc<Subscriber>) -> bool {
        let result = self.lock().callbacks.unregister(subscriber);
        match result {
            Ok((kind, scope)) => {
                debug!(subscriber = %subscriber.id(), %kind, %scope, "Callback unregistered");
                true
            }
            Err(err) => {
                warn!(%err, "Callback unregistration ignored");
                false
            }
        }
    }

    /// Route the result posted under `handle` to `subscriber`. A later
    /// registration for the same handle replaces this one. A subscriber may
    /// await any number of handles alongside its event registration; only
    /// the invalid handle is refused.
    pub fn register_call_result(&self, subscriber: &Arc<Subscriber>, handle: CallHandle) -> bool {
        let result = self.lock().call_results.register(subscriber, handle);
        match result {
            Ok(Some(displaced)) => {
                warn!(
                    %handle,
                    subscriber = %subscriber.id(),
                    displaced = %displaced.id(),
                    "Call result already registered, replacing"
                );
                true
            }
            Ok(None) => {
                debug!(%handle, subscriber = %subscriber.id(), "Call result registered");
                true
            }
            Err(err) => {
                error!(%err, "Call result registration rejected");
                false
            }
        }
    }

    /// Remove the mapping for `handle`, but only if `subscriber` owns it.
    pub fn unregister_call_result(&self, subscriber: &Arc<Subscriber>, handle: CallHandle) -> bool {
        let result = self.lock().call_results.unregister(subscriber, handle);
        match result {
            Ok(()) => {
                debug!(%handle, subscriber = %subscriber.id(), "Call result unregistered");
                true
            }
            Err(err) => {
                warn!(%err, "Call result unregistration ignored");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Producers
    // -----------------------------------------------------------------------

    /// Queue an event. The scope is `Secondary` when that scope has listeners
    /// for `kind`, `Primary` otherwise.
    pub fn try_post_event(&self, kind: EventKind, data: &[u8]) -> Result<(), DispatchError> {
        let payload = Payload::copy_from_slice(data)?;
        let len = payload.len();

        let scope = {
            let mut shared = self.lock();
            let scope = if shared.callbacks.contains_kind(kind, Scope::Secondary) {
                Scope::Secondary
            } else {
                Scope::Primary
            };
            shared.pending.push(QueuedEntry::Event {
                kind,
                scope,
                payload,
            });
            scope
        };

        self.counters.events_posted.fetch_add(1, Ordering::Relaxed);
        debug!(%kind, %scope, len, "Event queued");
        Ok(())
    }

    /// Queue an event for an explicit scope.
    pub fn try_post_event_to(
        &self,
        kind: EventKind,
        data: &[u8],
        scope: Scope,
    ) -> Result<(), DispatchError> {
        let payload = Payload::copy_from_slice(data)?;
        let len = payload.len();

        self.lock().pending.push(QueuedEntry::Event {
            kind,
            scope,
            payload,
        });

        self.counters.events_posted.fetch_add(1, Ordering::Relaxed);
        debug!(%kind, %scope, len, "Event queued");
        Ok(())
    }

    pub fn post_event(&self, kind: EventKind, data: &[u8]) -> bool {
        self.try_post_event(kind, data)
            .map_err(|err| error!(%err, %kind, "Event not queued"))
            .is_ok()
    }

    pub fn post_event_to(&self, kind: EventKind, data: &[u8], scope: Scope) -> bool {
        self.try_post_event_to(kind, data, scope)
            .map_err(|err| error!(%err, %kind, %scope, "Event not queued"))
            .is_ok()
    }

    /// Queue a call result under a freshly minted handle.
    pub fn try_post_call_result(
        &self,
        data: &[u8],
        io_failure: bool,
    ) -> Result<CallHandle, DispatchError> {
        let payload = Payload::copy_from_slice(data)?;
        let len = payload.len();
        let handle = CallHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));

        self.lock().pending.push(QueuedEntry::CallResult {
            handle,
            payload,
            io_failure,
        });

        self.counters
            .call_results_posted
            .fetch_add(1, Ordering::Relaxed);
        debug!(%handle, len, io_failure, "Call result queued");
        Ok(handle)
    }

    /// Returns [`CallHandle::INVALID`] if nothing was queued.
    pub fn post_call_result(&self, data: &[u8], io_failure: bool) -> CallHandle {
        self.try_post_call_result(data, io_failure)
            .unwrap_or_else(|err| {
                error!(%err, "Call result not queued");
                CallHandle::INVALID
            })
    }

    /// Deliver an event to every listener for `kind`, in both scopes, right
    /// now on the calling thread. Nothing is queued. Returns the number of
    /// invocations that completed.
    pub fn dispatch_immediate(&self, kind: EventKind, data: &[u8]) -> usize {
        let payload = match Payload::copy_from_slice(data) {
            Ok(payload) => payload,
            Err(err) => {
                error!(%err, %kind, "Immediate dispatch rejected");
                return 0;
            }
        };

        let listeners = {
            let shared = self.lock();
            let mut listeners = shared.callbacks.listeners(kind, Scope::Primary);
            listeners.extend(shared.callbacks.listeners(kind, Scope::Secondary));
            listeners
        };

        if listeners.is_empty() {
            debug!(%kind, "No listeners for immediate dispatch");
            return 0;
        }

        let mut report = PumpReport::default();
        for subscriber in &listeners {
            self.invoke(
                subscriber,
                Delivery::Event {
                    kind,
                    payload: payload.as_bytes(),
                },
                &mut report,
            );
        }
        report.delivered
    }

    // -----------------------------------------------------------------------
    // Pump
    // -----------------------------------------------------------------------

    /// Detach the pending queue and deliver every entry in posting order.
    ///
    /// Subscribers are resolved at this point, not at post time. Entries with
    /// nobody listening are logged and dropped. Safe to call from several
    /// threads at once, though the relative order of two concurrent pumps is
    /// unspecified.
    pub fn pump(&self) -> PumpReport {
        let batch = self.lock().pending.take();
        let mut report = PumpReport::default();
        if batch.is_empty() {
            return report;
        }

        let batch_len = batch.len();
        for entry in batch {
            match entry {
                QueuedEntry::CallResult {
                    handle,
                    payload,
                    io_failure,
                } => self.deliver_call_result(handle, &payload, io_failure, &mut report),
                QueuedEntry::Event {
                    kind,
                    scope,
                    payload,
                } => self.deliver_event(kind, scope, &payload, &mut report),
            }
        }

        debug!(
            entries = batch_len,
            delivered = report.delivered,
            orphaned = report.orphaned,
            panicked = report.panicked,
            "Pump complete"
        );
        report
    }

    fn deliver_call_result(
        &self,
        handle: CallHandle,
        payload: &Payload,
        io_failure: bool,
        report: &mut PumpReport,
    ) {
        let Some(subscriber) = self.lock().call_results.resolve(handle) else {
            error!(%handle, "Orphaned call result, dropping");
            report.orphaned += 1;
            self.counters.orphaned.fetch_add(1, Ordering::Relaxed);
            return;
        };

        debug!(%handle, subscriber = %subscriber.id(), "Delivering call result");
        self.invoke(
            &subscriber,
            Delivery::CallResult {
                handle,
                payload: payload.as_bytes(),
                io_failure,
            },
            report,
        );

        match self.config.call_result_retention {
            CallResultRetention::RemoveOnDelivery => {
                self.lock().call_results.complete(handle, subscriber.id());
            }
            CallResultRetention::Retain => {
                debug!(%handle, "Call result mapping retained after delivery");
            }
        }
    }

    fn deliver_event(
        &self,
        kind: EventKind,
        scope: Scope,
        payload: &Payload,
        report: &mut PumpReport,
    ) {
        let listeners = self.lock().callbacks.listeners(kind, scope);
        if listeners.is_empty() {
            error!(%kind, %scope, "No listener for event, dropping");
            report.orphaned += 1;
            self.counters.orphaned.fetch_add(1, Ordering::Relaxed);
            return;
        }

        for subscriber in &listeners {
            self.invoke(
                subscriber,
                Delivery::Event {
                    kind,
                    payload: payload.as_bytes(),
                },
                report,
            );
        }
    }

    /// Run subscriber code. Must never be called with the lock held.
    fn invoke(&self, subscriber: &Subscriber, delivery: Delivery<'_>, report: &mut PumpReport) {
        if !self.config.catch_panics {
            subscriber.run(delivery);
            report.delivered += 1;
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| subscriber.run(delivery))) {
            Ok(()) => {
                report.delivered += 1;
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                error!(subscriber = %subscriber.id(), "Subscriber panicked during delivery");
                report.panicked += 1;
                self.counters.panicked.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Drop every queued entry without delivering it. Returns the count.
    pub fn clear_pending(&self) -> usize {
        self.lock().pending.clear()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn listener_count(&self, kind: EventKind, scope: Scope) -> usize {
        self.lock().callbacks.listener_count(kind, scope)
    }

    pub fn call_result_count(&self) -> usize {
        self.lock().call_results.len()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            events_posted: self.counters.events_posted.load(Ordering::Relaxed),
            call_results_posted: self.counters.call_results_posted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            orphaned: self.counters.orphaned.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}
