use super::AuditSink;
use crate::error::SinkError;
use async_trait::async_trait;
use monay_audit_types::AuditEvent;
use std::sync::Arc;

/// Writes each event as a JSON line on the `audit` tracing target.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl TracingSink {
    /// Sink logging on the `audit` target.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn write(&self, event: Arc<AuditEvent>) -> Result<(), SinkError> {
        let json = serde_json::to_string(event.as_ref())?;
        ::tracing::info!(
            target: "audit",
            event_id = %event.id,
            action = %event.action,
            category = %event.category,
            severity = %event.severity,
            record = %json,
        );
        Ok(())
    }
}
