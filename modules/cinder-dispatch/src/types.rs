//! Identifiers and the owned payload buffer. Domain-agnostic.

use bytes::Bytes;
use std::fmt;

use crate::error::DispatchError;

/// Category of a repeatable notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(pub i32);

impl EventKind {
    /// Reserved kind meaning "an asynchronous call completed". Subscribers for
    /// it are resolved through call handles, never through the per-kind lists.
    pub const CALL_COMPLETED: EventKind = EventKind(703);

    pub fn is_call_completed(self) -> bool {
        self == Self::CALL_COMPLETED
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle identifying one pending asynchronous result. Minted by the
/// dispatcher, strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallHandle(pub u64);

impl CallHandle {
    pub const INVALID: CallHandle = CallHandle(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two independent subscriber populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Primary,
    Secondary,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Primary => "primary",
            Scope::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An owned copy of a producer's bytes. Never empty.
///
/// Cloning shares the buffer, so fanning one event out to several
/// subscribers does not copy it again.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    /// Copy `data` into a fresh buffer owned by the engine.
    pub fn copy_from_slice(data: &[u8]) -> Result<Self, DispatchError> {
        if data.is_empty() {
            return Err(DispatchError::EmptyPayload);
        }
        Ok(Self(Bytes::copy_from_slice(data)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed payload; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_rejects_empty_input() {
        assert_eq!(
            Payload::copy_from_slice(&[]).unwrap_err(),
            DispatchError::EmptyPayload
        );
    }

    #[test]
    fn payload_owns_its_bytes() {
        let mut source = vec![1u8, 2, 3];
        let payload = Payload::copy_from_slice(&source).unwrap();
        source[0] = 9;
        assert_eq!(payload.as_bytes(), &[1, 2, 3]);
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn invalid_handle_sentinel() {
        assert!(!CallHandle::INVALID.is_valid());
        assert!(CallHandle(1).is_valid());
    }
}
