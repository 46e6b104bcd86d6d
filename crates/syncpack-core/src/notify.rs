//! Live-progress notifications.
//!
//! Delivery is best-effort: a sink must never fail the step that pushes to it.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Receives live-progress events for an operation.
pub trait ProgressSink: Send + Sync {
    fn push(&self, event: &str, payload: Value);
}

/// Sink that drops everything.
pub struct NoOpSink;

impl ProgressSink for NoOpSink {
    fn push(&self, _event: &str, _payload: Value) {}
}

/// Sink that keeps every event in memory, for hosts that poll and for tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<(String, Value)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Names of the events received so far, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }
}

impl ProgressSink for MemorySink {
    fn push(&self, event: &str, payload: Value) {
        match self.events.lock() {
            Ok(mut events) => events.push((event.to_string(), payload)),
            Err(e) => tracing::warn!(event, "Progress sink lock poisoned: {}", e),
        }
    }
}

/// Handle to a sink, carried on a pack request but never serialized.
#[derive(Clone)]
pub struct Callbacks(Arc<dyn ProgressSink>);

impl Callbacks {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self(sink)
    }

    pub fn push(&self, event: &str, payload: Value) {
        self.0.push(event, payload);
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callbacks(..)")
    }
}
