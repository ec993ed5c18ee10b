//! Fire-and-forget event delivery.
//!
//! [`AuditCapture::record`] never awaits: it pushes onto a bounded channel
//! and returns. A background loop hands every event to the sink on its own
//! task, so a slow or failing sink cannot hold up a response.

use crate::sink::AuditSink;
use monay_audit_types::AuditEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Tracing target for dropped or failed audit writes. Kept separate from the
/// `audit` target the records themselves may be written to.
pub const FAILURE_TARGET: &str = "monay_audit::failures";

/// Configuration for the delivery channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Events buffered before new ones are dropped.
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10_000,
        }
    }
}

/// Handle for submitting audit events.
#[derive(Debug, Clone)]
pub struct AuditCapture {
    sender: mpsc::Sender<Arc<AuditEvent>>,
}

impl AuditCapture {
    /// Create a capture handle and the receiving end of its channel.
    pub fn new(config: &CaptureConfig) -> (Self, mpsc::Receiver<Arc<AuditEvent>>) {
        let (sender, receiver) = mpsc::channel(config.buffer_size.max(1));
        (Self { sender }, receiver)
    }

    /// Create a capture handle whose delivery loop writes to `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, config: &CaptureConfig) -> Self {
        let (capture, receiver) = Self::new(config);
        tokio::spawn(delivery_loop(receiver, sink));
        capture
    }

    /// Queue an event for delivery without waiting.
    ///
    /// Returns `false` when the event was dropped.
    pub fn record(&self, event: AuditEvent) -> bool {
        let event = Arc::new(event);
        match self.sender.try_send(event) {
            Ok(()) => {
                debug!("Audit event captured");
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    target: FAILURE_TARGET,
                    action = %event.action,
                    resource = %event.resource,
                    "Audit buffer full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!(
                    target: FAILURE_TARGET,
                    action = %event.action,
                    resource = %event.resource,
                    "Audit channel closed, event dropped"
                );
                false
            }
        }
    }

    /// Check if the delivery loop is still running.
    pub fn is_healthy(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Get approximate buffer usage.
    pub fn buffer_usage(&self) -> f64 {
        let capacity = self.sender.capacity();
        let max_capacity = self.sender.max_capacity();
        1.0 - (capacity as f64 / max_capacity as f64)
    }
}

/// Drain `receiver`, writing each event to `sink` on its own task.
///
/// Runs until every [`AuditCapture`] handle is dropped.
pub async fn delivery_loop(mut receiver: mpsc::Receiver<Arc<AuditEvent>>, sink: Arc<dyn AuditSink>) {
    while let Some(event) = receiver.recv().await {
        tokio::spawn(deliver(Arc::clone(&sink), event));
    }
    debug!(sink = sink.name(), "Audit delivery loop stopped");
}

async fn deliver(sink: Arc<dyn AuditSink>, event: Arc<AuditEvent>) {
    if let Err(e) = sink.write(Arc::clone(&event)).await {
        warn!(
            target: FAILURE_TARGET,
            sink = sink.name(),
            event_id = %event.id,
            action = %event.action,
            resource = %event.resource,
            error = %e,
            "Audit sink write failed"
        );
    }
}
