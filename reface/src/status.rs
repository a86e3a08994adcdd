//! Run status reporting.
//!
//! Every stage announces itself through a [`StatusReporter`], which stamps
//! the message with a process-wide sequence number, a timestamp and the
//! current [`PipelineState`], then hands it to each registered
//! [`StatusSink`] in order. Sinks are synchronous and must not block.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::pipeline::PipelineState;

/// Tag used for messages not emitted by a frame processor.
pub const CORE_TAG: &str = "reface.core";

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// One progress message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub stage: PipelineState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
}

impl StatusEvent {
    /// The processor tag, or [`CORE_TAG`].
    pub fn tag(&self) -> &str {
        self.processor.as_deref().unwrap_or(CORE_TAG)
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tag().to_uppercase(), self.message)
    }
}

/// Consumer of status events.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: &StatusEvent);
}

/// Fans status events out to a list of sinks.
#[derive(Clone, Default)]
pub struct StatusReporter {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl StatusReporter {
    /// Reporter that only mirrors events into `tracing`.
    pub fn new() -> Self {
        Self::default().with_sink(Arc::new(TracingStatusSink))
    }

    /// Reporter with no sinks.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn StatusSink>) {
        self.sinks.push(sink);
    }

    /// Emit an untagged message.
    pub fn emit(&self, stage: PipelineState, message: impl Into<String>) -> StatusEvent {
        self.publish(stage, message.into(), None)
    }

    /// Emit a message tagged with a processor name.
    pub fn emit_tagged(
        &self,
        stage: PipelineState,
        processor: &str,
        message: impl Into<String>,
    ) -> StatusEvent {
        self.publish(stage, message.into(), Some(processor.to_string()))
    }

    fn publish(
        &self,
        stage: PipelineState,
        message: String,
        processor: Option<String>,
    ) -> StatusEvent {
        let event = StatusEvent {
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            stage,
            message,
            processor,
        };
        for sink in &self.sinks {
            sink.emit(&event);
        }
        event
    }
}

/// Mirrors status events into `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn emit(&self, event: &StatusEvent) {
        info!(
            seq = event.seq,
            stage = %event.stage,
            processor = event.processor.as_deref(),
            "{}",
            event
        );
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

impl StatusSink for MemoryStatusSink {
    fn emit(&self, event: &StatusEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Publishes events on a tokio broadcast channel for live consumers.
///
/// Slow subscribers lag and lose the oldest events; publishing never waits.
#[derive(Debug, Clone)]
pub struct BroadcastStatusSink {
    tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastStatusSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

impl StatusSink for BroadcastStatusSink {
    fn emit(&self, event: &StatusEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}
