//! Audit event capture for the Monay request audit pipeline.
//!
//! Framework-independent core shared by the HTTP interceptor and the typed
//! emitters:
//!
//! - Recursive redaction of bodies and headers
//! - Action, resource and category classification from method and path
//! - Inclusion policy and its configuration
//! - Fire-and-forget delivery to a pluggable [`AuditSink`]

mod capture;
pub mod classify;
mod config;
mod context;
mod emitter;
mod error;
pub mod redact;
pub mod sink;

pub use capture::{delivery_loop, AuditCapture, CaptureConfig, FAILURE_TARGET};
pub use config::{vars, AuditConfig};
pub use context::{
    AuditIdentity, ComplianceAnnotations, Completion, RequestContext, SecurityAnnotations,
};
pub use emitter::{ActionOptions, AuditEmitter};
pub use error::{ConfigError, SinkError};
pub use redact::{redact, redact_headers, MarkerSet, REDACTED};
pub use sink::{AuditSink, JsonLinesSink, MemorySink, TracingSink};

// Re-export types for convenience
pub use monay_audit_types::{
    AuditCategory, AuditDetails, AuditEvent, AuditEventBuilder, AuditEventId, AuditMetadata,
    AuditSeverity,
};
