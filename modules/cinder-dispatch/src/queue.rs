//! Pending deliveries, in posting order.

use std::collections::VecDeque;
use std::mem;

use crate::types::{CallHandle, EventKind, Payload, Scope};

/// A posted notification waiting for the next pump. Owns its payload; the
/// buffer is released when the entry is delivered or dropped as orphaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedEntry {
    Event {
        kind: EventKind,
        scope: Scope,
        payload: Payload,
    },
    CallResult {
        handle: CallHandle,
        payload: Payload,
        io_failure: bool,
    },
}

#[derive(Debug, Default)]
pub struct EventQueue {
    entries: VecDeque<QueuedEntry>,
}

impl EventQueue {
    pub fn push(&mut self, entry: QueuedEntry) {
        self.entries.push_back(entry);
    }

    /// Detach everything queued so far, leaving a fresh empty queue behind.
    pub fn take(&mut self) -> EventQueue {
        mem::take(self)
    }

    /// Discard every pending entry. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for EventQueue {
    type Item = QueuedEntry;
    type IntoIter = std::collections::vec_deque::IntoIter<QueuedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
