//! Append-only audit trail, one event per pipeline transition.

use crate::orchestrator::{PipelineEvent, PipelineState};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

/// A single state transition of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub request_id: Uuid,
    /// Position within the request, starting at 1
    pub sequence: u32,
    pub from: PipelineState,
    pub event: PipelineEvent,
    pub to: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

/// Receiver of audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes each event as a structured `tracing` record under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let detail = event.detail.as_deref().unwrap_or("");
        match event.to {
            PipelineState::Failed => tracing::warn!(
                target: "audit",
                request_id = %event.request_id,
                sequence = event.sequence,
                from = ?event.from,
                event = ?event.event,
                to = ?event.to,
                elapsed_ms = event.elapsed_ms,
                "{}",
                detail
            ),
            _ => tracing::info!(
                target: "audit",
                request_id = %event.request_id,
                sequence = event.sequence,
                from = ?event.from,
                event = ?event.event,
                to = ?event.to,
                elapsed_ms = event.elapsed_ms,
                "{}",
                detail
            ),
        }
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events of one request, in order.
    pub fn for_request(&self, request_id: Uuid) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.request_id == request_id)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
