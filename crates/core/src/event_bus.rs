//! Outreach event bus: trait for emitting lifecycle events from the
//! campaign and matching engines.
//!
//! Engines accept an `Arc<dyn EventSink>`; deployments route events to an
//! audit log or a webhook, tests capture them in memory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutreachEventType {
    ExecutionEnrolled,
    StepDispatched,
    ExecutionStopped,
    ExecutionCompleted,
    ExecutionFailed,
    DocumentAutoMatched,
    DocumentProposed,
    DocumentApproved,
    DocumentRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachEvent {
    pub event_id: Uuid,
    pub event_type: OutreachEventType,
    pub line_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OutreachEvent {
    pub fn with_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn with_document(mut self, document_id: Uuid) -> Self {
        self.document_id = Some(document_id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: OutreachEvent);
}

/// No-op sink for deployments that don't consume events.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: OutreachEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<OutreachEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutreachEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: OutreachEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: OutreachEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for an `OutreachEvent` about a line.
pub fn make_event(
    event_type: OutreachEventType,
    line_id: Option<Uuid>,
    timestamp: DateTime<Utc>,
) -> OutreachEvent {
    OutreachEvent {
        event_id: Uuid::new_v4(),
        event_type,
        line_id,
        execution_id: None,
        document_id: None,
        detail: None,
        timestamp,
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
