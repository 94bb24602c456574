//! Subscriber bookkeeping. Both registries are plain data; the dispatcher
//! owns them behind its shared lock and does all the logging.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::subscriber::{Registration, Subscriber, SubscriberId};
use crate::types::{CallHandle, EventKind, Scope};

type Listeners = HashMap<EventKind, Vec<Arc<Subscriber>>>;

// ---------------------------------------------------------------------------
// CallbackRegistry
// ---------------------------------------------------------------------------

/// (scope, kind) → subscribers in registration order.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    primary: Listeners,
    secondary: Listeners,
}

impl CallbackRegistry {
    fn scope(&self, scope: Scope) -> &Listeners {
        match scope {
            Scope::Primary => &self.primary,
            Scope::Secondary => &self.secondary,
        }
    }

    fn scope_mut(&mut self, scope: Scope) -> &mut Listeners {
        match scope {
            Scope::Primary => &mut self.primary,
            Scope::Secondary => &mut self.secondary,
        }
    }

    pub fn register(
        &mut self,
        subscriber: &Arc<Subscriber>,
        kind: EventKind,
        scope: Scope,
    ) -> Result<(), DispatchError> {
        let id = subscriber.id();
        let already = DispatchError::AlreadyRegistered {
            subscriber: id,
            kind,
            scope,
        };

        match subscriber.registration() {
            Registration::Unregistered => {}
            Registration::Callback {
                kind: current_kind,
                scope: current_scope,
            } if current_kind == kind && current_scope == scope => return Err(already),
            _ => return Err(DispatchError::RegisteredElsewhere(id)),
        }

        // The reserved kind only flips the subscriber's state; delivery for it
        // goes through call handles.
        if !kind.is_call_completed() {
            let list = self.scope_mut(scope).entry(kind).or_default();
            if list.iter().any(|s| s.id() == id) {
                return Err(already);
            }
            list.push(Arc::clone(subscriber));
        }

        subscriber.set_registration(Registration::Callback { kind, scope });
        Ok(())
    }

    /// Returns the (kind, scope) the subscriber was removed from.
    pub fn unregister(
        &mut self,
        subscriber: &Arc<Subscriber>,
    ) -> Result<(EventKind, Scope), DispatchError> {
        let id = subscriber.id();
        let Registration::Callback { kind, scope } = subscriber.registration() else {
            return Err(DispatchError::NotRegistered(id));
        };

        if !kind.is_call_completed() {
            let listeners = self.scope_mut(scope);
            let list = listeners
                .get_mut(&kind)
                .ok_or(DispatchError::NotRegistered(id))?;
            let pos = list
                .iter()
                .position(|s| s.id() == id)
                .ok_or(DispatchError::NotRegistered(id))?;
            list.remove(pos);
            if list.is_empty() {
                listeners.remove(&kind);
            }
        }

        subscriber.set_registration(Registration::Unregistered);
        Ok((kind, scope))
    }

    /// Snapshot of the listeners for (scope, kind), in registration order.
    pub fn listeners(&self, kind: EventKind, scope: Scope) -> Vec<Arc<Subscriber>> {
        self.scope(scope).get(&kind).cloned().unwrap_or_default()
    }

    pub fn contains_kind(&self, kind: EventKind, scope: Scope) -> bool {
        self.scope(scope).contains_key(&kind)
    }

    pub fn listener_count(&self, kind: EventKind, scope: Scope) -> usize {
        self.scope(scope).get(&kind).map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub fn kind_count(&self, scope: Scope) -> usize {
        self.scope(scope).len()
    }
}

// ---------------------------------------------------------------------------
// CallResultRegistry
// ---------------------------------------------------------------------------

/// Call handle → the one subscriber awaiting it.
#[derive(Default)]
pub(crate) struct CallResultRegistry {
    awaiting: HashMap<CallHandle, Arc<Subscriber>>,
}

impl CallResultRegistry {
    /// Register `subscriber` for `handle`. The newest registration wins; the
    /// displaced subscriber (if any) is returned after it stops awaiting
    /// `handle`. Independent of the subscriber's event registration and of
    /// any other handles it awaits.
    pub fn register(
        &mut self,
        subscriber: &Arc<Subscriber>,
        handle: CallHandle,
    ) -> Result<Option<Arc<Subscriber>>, DispatchError> {
        if !handle.is_valid() {
            return Err(DispatchError::InvalidHandle(handle));
        }

        let id = subscriber.id();
        let displaced = self
            .awaiting
            .insert(handle, Arc::clone(subscriber))
            .filter(|previous| previous.id() != id);
        if let Some(previous) = &displaced {
            previous.forget_call_result(handle);
        }

        subscriber.await_call_result(handle);
        Ok(displaced)
    }

    /// Remove the mapping only if `subscriber` is the one registered for it.
    pub fn unregister(
        &mut self,
        subscriber: &Arc<Subscriber>,
        handle: CallHandle,
    ) -> Result<(), DispatchError> {
        if !handle.is_valid() {
            return Err(DispatchError::InvalidHandle(handle));
        }

        let id = subscriber.id();
        match self.awaiting.get(&handle) {
            Some(current) if current.id() == id => {
                self.awaiting.remove(&handle);
                subscriber.forget_call_result(handle);
                Ok(())
            }
            Some(_) => Err(DispatchError::OwnerMismatch {
                subscriber: id,
                handle,
            }),
            None => Err(DispatchError::NotRegistered(id)),
        }
    }

    pub fn resolve(&self, handle: CallHandle) -> Option<Arc<Subscriber>> {
        self.awaiting.get(&handle).cloned()
    }

    /// Drop the mapping after delivery, unless someone else took the handle
    /// over in the meantime. Returns whether a mapping was removed.
    pub fn complete(&mut self, handle: CallHandle, delivered_to: SubscriberId) -> bool {
        match self.awaiting.get(&handle) {
            Some(current) if current.id() == delivered_to => {
                if let Some(subscriber) = self.awaiting.remove(&handle) {
                    subscriber.forget_call_result(handle);
                }
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.awaiting.len()
    }
}
