//! Audit-log collaborator.

use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure(String),
}

/// One engine operation, as reported to the audit sink.
#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub server_name: &'a str,
    pub user_id: &'a str,
    pub operation: &'static str,
    pub type_name: &'a str,
    pub guid: Option<&'a str>,
    pub outcome: AuditOutcome,
}

impl fmt::Display for AuditEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} {} {}",
            self.server_name,
            self.user_id,
            self.operation,
            self.type_name,
            self.guid.unwrap_or("-")
        )?;
        if let AuditOutcome::Failure(reason) = &self.outcome {
            write!(f, " failed: {reason}")?;
        }
        Ok(())
    }
}

/// Structured sink for operation outcomes.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: &AuditEvent<'_>);
}

/// Emits audit events as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: &AuditEvent<'_>) {
        match &event.outcome {
            AuditOutcome::Success => tracing::info!(
                server = event.server_name,
                user = event.user_id,
                operation = event.operation,
                type_name = event.type_name,
                guid = event.guid.unwrap_or("-"),
                "operation succeeded"
            ),
            AuditOutcome::Failure(reason) => tracing::warn!(
                server = event.server_name,
                user = event.user_id,
                operation = event.operation,
                type_name = event.type_name,
                guid = event.guid.unwrap_or("-"),
                reason = %reason,
                "operation failed"
            ),
        }
    }
}

/// Owned copy of an [`AuditEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub user_id: String,
    pub operation: String,
    pub type_name: String,
    pub guid: Option<String>,
    pub outcome: AuditOutcome,
}

/// Keeps every event in memory, for embedders that inspect the trail.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn failures(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e.outcome, AuditOutcome::Failure(_)))
            .cloned()
            .collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, event: &AuditEvent<'_>) {
        self.events.lock().push(RecordedEvent {
            user_id: event.user_id.to_string(),
            operation: event.operation.to_string(),
            type_name: event.type_name.to_string(),
            guid: event.guid.map(str::to_string),
            outcome: event.outcome.clone(),
        });
    }
}
