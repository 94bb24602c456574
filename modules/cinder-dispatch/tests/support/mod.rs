//! Shared test helpers: a recording subscriber and a log-capturing layer.
#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};

use cinder_dispatch::{CallHandle, Delivery, EventKind, Subscriber};
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Event {
        kind: EventKind,
        payload: Vec<u8>,
    },
    CallResult {
        handle: CallHandle,
        payload: Vec<u8>,
        io_failure: bool,
    },
}

impl From<Delivery<'_>> for Recorded {
    fn from(delivery: Delivery<'_>) -> Self {
        match delivery {
            Delivery::Event { kind, payload } => Recorded::Event {
                kind,
                payload: payload.to_vec(),
            },
            Delivery::CallResult {
                handle,
                payload,
                io_failure,
            } => Recorded::CallResult {
                handle,
                payload: payload.to_vec(),
                io_failure,
            },
        }
    }
}

/// Everything a subscriber was handed, in order.
#[derive(Default)]
pub struct Recorder {
    deliveries: Mutex<Vec<Recorded>>,
}

impl Recorder {
    pub fn deliveries(&self) -> Vec<Recorded> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

/// A subscriber that records every delivery.
pub fn recording() -> (Arc<Subscriber>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let sink = Arc::clone(&recorder);
    let subscriber = Subscriber::from_fn(move |delivery| {
        sink.deliveries.lock().unwrap().push(delivery.into());
    });
    (subscriber, recorder)
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// Collects (level, message) for every tracing event on the current thread.
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    /// Run `f` with this capture installed as the thread's default subscriber.
    pub fn run<R>(f: impl FnOnce() -> R) -> (R, LogCapture) {
        let capture = LogCapture::default();
        let subscriber = Registry::default().with(capture.clone());
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, capture)
    }

    /// Number of events at `level` whose message contains `needle`.
    pub fn count(&self, level: Level, needle: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, message)| *l == level && message.contains(needle))
            .count()
    }

    pub fn count_level(&self, level: Level) -> usize {
        self.count(level, "")
    }
}

impl<S: tracing::Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.lines
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
