//! HTTP integration for the Monay request audit pipeline.
//!
//! [`AuditLayer`] observes the request lifecycle on an axum router or any
//! tower service over `Request<Body>`. The typed layers emit named,
//! compliance and security events for individual routes.
//!
//! ```ignore
//! let layer = AuditLayer::spawn(Arc::new(TracingSink::new()), AuditConfig::default());
//! let app = Router::new()
//!     .route("/api/payments", post(create_payment))
//!     .layer(layer);
//! ```

mod body;
mod emitters;
mod extract;
mod layer;

pub use body::{BodyOutcome, BodyTap, CompletionBody, TeeBody, DROPPED_BEFORE_COMPLETION};
pub use emitters::{
    ActionAuditLayer, ComplianceAuditLayer, SecurityAuditLayer, TypedAuditMiddleware,
};
pub use extract::AuditRouteParams;
pub use layer::{AuditLayer, AuditMiddleware};

// Re-export the capture API so applications depend on one crate
pub use monay_audit_capture::{
    ActionOptions, AuditCapture, AuditCategory, AuditConfig, AuditEmitter, AuditEvent,
    AuditIdentity, AuditSeverity, AuditSink, ComplianceAnnotations, JsonLinesSink, MemorySink,
    SecurityAnnotations, SinkError, TracingSink,
};
