//! Event sink trait and implementations.

use super::EventKind;
use async_trait::async_trait;
use tracing::{debug, info, Level};

/// Receives run events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    ///
    /// # Arguments
    ///
    /// * `kind` - What happened
    /// * `data` - Event payload (stage name, status, timings...)
    async fn emit(&self, kind: EventKind, data: serde_json::Value);

    /// Emits an event without waiting.
    ///
    /// Must never fail; problems are logged and swallowed.
    fn try_emit(&self, kind: EventKind, data: serde_json::Value);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _kind: EventKind, _data: serde_json::Value) {}

    fn try_emit(&self, _kind: EventKind, _data: serde_json::Value) {}
}

/// Writes events to the `tracing` log.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at `level`; anything but DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, kind: EventKind, data: &serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(event = %kind, data = %data, "Event: {kind}");
        } else {
            info!(event = %kind, data = %data, "Event: {kind}");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, kind: EventKind, data: serde_json::Value) {
        self.log_event(kind, &data);
    }

    fn try_emit(&self, kind: EventKind, data: serde_json::Value) {
        self.log_event(kind, &data);
    }
}

/// Keeps every event in memory, for tests and callers that report later.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(EventKind, serde_json::Value)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(EventKind, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Just the kinds, in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(|(kind, _)| *kind).collect()
    }

    /// Events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<serde_json::Value> {
        self.events
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Forgets all events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, kind: EventKind, data: serde_json::Value) {
        self.events.write().push((kind, data));
    }

    fn try_emit(&self, kind: EventKind, data: serde_json::Value) {
        self.events.write().push((kind, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit(EventKind::PipelineStarted, serde_json::Value::Null).await;
        let sink = LoggingEventSink::debug();
        sink.emit(EventKind::StageStarted, serde_json::json!({"stage": "Coaddition"})).await;
        sink.try_emit(EventKind::StageCompleted, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(EventKind::StageStarted, serde_json::json!({"stage": "Find_Data"})).await;
        sink.try_emit(EventKind::QaFailed, serde_json::json!({"check": "Check_HDUs"}));
        sink.emit(EventKind::StageStarted, serde_json::json!({"stage": "Coaddition"})).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.kinds()[1], EventKind::QaFailed);
        assert_eq!(sink.of_kind(EventKind::StageStarted).len(), 2);

        sink.clear();
        assert!(sink.is_empty());
    }
}
