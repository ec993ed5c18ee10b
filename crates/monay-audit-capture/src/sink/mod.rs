//! Audit sinks.
//!
//! A sink is the only contract the surrounding application must implement.
//! It receives each finished event exactly once and owns retention, retries
//! and backpressure.

mod file;
mod memory;
mod tracing;

pub use self::file::JsonLinesSink;
pub use self::memory::MemorySink;
pub use self::tracing::TracingSink;

use crate::error::SinkError;
use async_trait::async_trait;
use monay_audit_types::AuditEvent;
use std::sync::Arc;

/// Destination for finished audit events.
///
/// Implementations must tolerate concurrent writes from many in-flight
/// requests.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Short name used in diagnostic logs.
    fn name(&self) -> &str;

    /// Persist or forward one event.
    async fn write(&self, event: Arc<AuditEvent>) -> Result<(), SinkError>;
}
