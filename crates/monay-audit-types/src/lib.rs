//! Audit event types for the Monay request audit pipeline.
//!
//! An [`AuditEvent`] is the one durable artifact the pipeline produces. It is
//! assembled through [`AuditEventBuilder`], never mutated after `build()`, and
//! handed to a sink exactly once.

mod category;
mod event;
mod id;
mod severity;

pub use category::AuditCategory;
pub use event::{AuditDetails, AuditEvent, AuditEventBuilder, AuditMetadata};
pub use id::AuditEventId;
pub use severity::AuditSeverity;

/// Placeholder written into `action` when none could be derived.
pub const UNKNOWN_ACTION: &str = "UNKNOWN";

/// Placeholder written into `resource` when none could be derived.
pub const UNKNOWN_RESOURCE: &str = "unknown";
