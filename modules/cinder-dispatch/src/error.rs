use thiserror::Error;

use crate::types::{CallHandle, EventKind, Scope};
use crate::subscriber::SubscriberId;

/// Misuse of the dispatch API. Every variant is handled locally: the engine
/// logs it and reports a failure value, it never aborts the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("call handle {0} is the invalid sentinel")]
    InvalidHandle(CallHandle),

    #[error("subscriber {subscriber} is already registered for kind {kind} in {scope} scope")]
    AlreadyRegistered {
        subscriber: SubscriberId,
        kind: EventKind,
        scope: Scope,
    },

    #[error("subscriber {0} already listens for a different event kind or scope")]
    RegisteredElsewhere(SubscriberId),

    #[error("subscriber {0} is not registered")]
    NotRegistered(SubscriberId),

    #[error("call handle {handle} is not owned by subscriber {subscriber}")]
    OwnerMismatch {
        subscriber: SubscriberId,
        handle: CallHandle,
    },
}
