//! Native event sources
//!
//! An [`EventSource`] is owned by a reflected instance and fires the event
//! channels declared in its descriptor. Sinks connected to it receive every
//! firing on the emitting thread; they must not block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::NativeValue;

/// Receiver of event firings
pub trait EventSink: Send + Sync {
    /// Called for each firing of the event at `method_index`
    fn fire(&self, method_index: usize, args: &[NativeValue]);
}

/// Unique identifier for a sink connection
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new unique connection ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out point for event firings
#[derive(Default)]
pub struct EventSource {
    sinks: Mutex<Vec<(ConnectionId, Arc<dyn EventSink>)>>,
}

impl EventSource {
    /// Create a source with no sinks
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a sink
    pub fn connect(&self, sink: Arc<dyn EventSink>) -> ConnectionId {
        let id = ConnectionId::new();
        self.sinks.lock().push((id, sink));
        id
    }

    /// Disconnect a sink. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|(conn, _)| *conn != id);
        sinks.len() != before
    }

    /// Fire the event at `method_index` to every connected sink
    pub fn emit(&self, method_index: usize, args: &[NativeValue]) {
        let sinks: Vec<Arc<dyn EventSink>> =
            self.sinks.lock().iter().map(|(_, sink)| sink.clone()).collect();
        for sink in sinks {
            sink.fire(method_index, args);
        }
    }

    /// Number of connected sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(usize, Vec<NativeValue>)>>,
    }

    impl EventSink for Recorder {
        fn fire(&self, method_index: usize, args: &[NativeValue]) {
            self.seen.lock().push((method_index, args.to_vec()));
        }
    }

    #[test]
    fn test_emit_without_sinks_is_noop() {
        let source = EventSource::new();
        source.emit(0, &[NativeValue::int(1)]);
        assert_eq!(source.sink_count(), 0);
    }

    #[test]
    fn test_emit_reaches_connected_sink() {
        let source = EventSource::new();
        let recorder = Arc::new(Recorder::default());
        let id = source.connect(recorder.clone());
        source.emit(2, &[NativeValue::int(7)]);

        assert!(source.disconnect(id));
        assert!(!source.disconnect(id));
        source.emit(2, &[NativeValue::int(8)]);

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 2);
        assert_eq!(seen[0].1[0].as_int(), Some(7));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
