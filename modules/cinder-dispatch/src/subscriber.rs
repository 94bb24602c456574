//! Consumer-side handles.
//!
//! A consumer builds a [`Subscriber`] around its [`Callback`], keeps the
//! `Arc`, and hands clones of it to the dispatcher when it starts listening.
//! The dispatcher never creates or destroys subscribers; it only records and
//! clears their [`Registration`] and the call handles they await.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{CallHandle, EventKind, Scope};

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The ongoing event a subscriber listens for. At most one at a time; call
/// results are tracked separately and never count against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Registration {
    #[default]
    Unregistered,
    Callback {
        kind: EventKind,
        scope: Scope,
    },
}

impl Registration {
    pub fn is_registered(&self) -> bool {
        !matches!(self, Registration::Unregistered)
    }
}

/// A single delivery handed to subscriber code. The payload view is only
/// valid for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery<'a> {
    Event {
        kind: EventKind,
        payload: &'a [u8],
    },
    CallResult {
        handle: CallHandle,
        payload: &'a [u8],
        io_failure: bool,
    },
}

impl<'a> Delivery<'a> {
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Delivery::Event { payload, .. } | Delivery::CallResult { payload, .. } => payload,
        }
    }
}

/// Subscriber code. Runs without any dispatcher lock held, so it may call
/// back into the dispatcher freely.
pub trait Callback: Send + Sync {
    fn run(&self, delivery: Delivery<'_>);
}

impl<F> Callback for F
where
    F: for<'a> Fn(Delivery<'a>) + Send + Sync,
{
    fn run(&self, delivery: Delivery<'_>) {
        self(delivery)
    }
}

#[derive(Default)]
struct State {
    registration: Registration,
    awaiting: BTreeSet<CallHandle>,
}

pub struct Subscriber {
    id: SubscriberId,
    callback: Box<dyn Callback>,
    state: Mutex<State>,
}

impl Subscriber {
    pub fn new(callback: impl Callback + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::next(),
            callback: Box::new(callback),
            state: Mutex::new(State::default()),
        })
    }

    /// Build a subscriber from a closure.
    pub fn from_fn<F>(f: F) -> Arc<Self>
    where
        F: Fn(Delivery<'_>) + Send + Sync + 'static,
    {
        Self::new(f)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn registration(&self) -> Registration {
        self.state().registration
    }

    /// Call handles this subscriber is currently mapped to, ascending.
    pub fn awaiting(&self) -> Vec<CallHandle> {
        self.state().awaiting.iter().copied().collect()
    }

    pub fn is_awaiting(&self, handle: CallHandle) -> bool {
        self.state().awaiting.contains(&handle)
    }

    /// True while the subscriber listens for an event kind or awaits any
    /// call result.
    pub fn is_registered(&self) -> bool {
        let state = self.state();
        state.registration.is_registered() || !state.awaiting.is_empty()
    }

    pub(crate) fn set_registration(&self, registration: Registration) {
        self.state().registration = registration;
    }

    pub(crate) fn await_call_result(&self, handle: CallHandle) {
        self.state().awaiting.insert(handle);
    }

    pub(crate) fn forget_call_result(&self, handle: CallHandle) {
        self.state().awaiting.remove(&handle);
    }

    pub(crate) fn run(&self, delivery: Delivery<'_>) {
        self.callback.run(delivery);
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("registration", &self.registration())
            .field("awaiting", &self.awaiting())
            .finish_non_exhaustive()
    }
}
