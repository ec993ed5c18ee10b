//! Typed audit layers for individual routes.
//!
//! Unlike [`AuditLayer`](crate::AuditLayer) these ignore the inclusion
//! policy: attaching one to a route is the decision to audit it.

use crate::body::{BodyTap, CompletionBody};
use crate::extract::{prepare, tap_body, Prepared};
use axum::{
    body::Body,
    extract::Request,
    http::{Method, Response},
};
use futures::future::BoxFuture;
use monay_audit_capture::{
    ActionOptions, AuditConfig, AuditEmitter, AuditSeverity, ComplianceAnnotations, Completion,
    RequestContext, SecurityAnnotations,
};
use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};

#[derive(Debug, Clone)]
enum Kind {
    Action(Arc<ActionOptions>),
    Compliance(Arc<str>),
    Security {
        event_type: Arc<str>,
        severity: Option<AuditSeverity>,
    },
}

/// Emits a named business action once the handler has read the request body
/// (or returned without reading it) and, optionally, `<ACTION>_RESPONSE` once
/// the response has streamed.
#[derive(Debug, Clone)]
pub struct ActionAuditLayer {
    emitter: AuditEmitter,
    options: Arc<ActionOptions>,
    max_body_bytes: usize,
}

impl ActionAuditLayer {
    /// Layer emitting the action described by `options`.
    pub fn new(emitter: AuditEmitter, options: ActionOptions) -> Self {
        Self {
            emitter,
            options: Arc::new(options),
            max_body_bytes: AuditConfig::default().max_body_bytes,
        }
    }

    /// Cap on request and response bodies parsed into records.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

impl<S> Layer<S> for ActionAuditLayer {
    type Service = TypedAuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TypedAuditMiddleware {
            inner,
            emitter: self.emitter.clone(),
            kind: Kind::Action(self.options.clone()),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Emits `COMPLIANCE_<TYPE>` after the handler.
///
/// [`ComplianceAnnotations`] are read from the request extensions; a set
/// attached to the response by the handler replaces them.
#[derive(Debug, Clone)]
pub struct ComplianceAuditLayer {
    emitter: AuditEmitter,
    check_type: Arc<str>,
    max_body_bytes: usize,
}

impl ComplianceAuditLayer {
    /// Layer emitting `COMPLIANCE_<check_type>`.
    pub fn new(emitter: AuditEmitter, check_type: impl Into<String>) -> Self {
        let check_type: String = check_type.into();
        Self {
            emitter,
            check_type: check_type.into(),
            max_body_bytes: AuditConfig::default().max_body_bytes,
        }
    }

    /// Cap on request bodies parsed into records.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

impl<S> Layer<S> for ComplianceAuditLayer {
    type Service = TypedAuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TypedAuditMiddleware {
            inner,
            emitter: self.emitter.clone(),
            kind: Kind::Compliance(self.check_type.clone()),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Emits `SECURITY_<TYPE>` after the handler, at `SECURITY` severity unless
/// overridden.
///
/// [`SecurityAnnotations`] resolve the same way as for
/// [`ComplianceAuditLayer`].
#[derive(Debug, Clone)]
pub struct SecurityAuditLayer {
    emitter: AuditEmitter,
    event_type: Arc<str>,
    severity: Option<AuditSeverity>,
    max_body_bytes: usize,
}

impl SecurityAuditLayer {
    /// Layer emitting `SECURITY_<event_type>`.
    pub fn new(emitter: AuditEmitter, event_type: impl Into<String>) -> Self {
        let event_type: String = event_type.into();
        Self {
            emitter,
            event_type: event_type.into(),
            severity: None,
            max_body_bytes: AuditConfig::default().max_body_bytes,
        }
    }

    /// Severity used instead of `SECURITY`.
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Cap on request bodies parsed into records.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

impl<S> Layer<S> for SecurityAuditLayer {
    type Service = TypedAuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TypedAuditMiddleware {
            inner,
            emitter: self.emitter.clone(),
            kind: Kind::Security {
                event_type: self.event_type.clone(),
                severity: self.severity,
            },
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Service produced by the typed audit layers.
#[derive(Clone)]
pub struct TypedAuditMiddleware<S> {
    inner: S,
    emitter: AuditEmitter,
    kind: Kind,
    max_body_bytes: usize,
}

impl<S> Service<Request> for TypedAuditMiddleware<S>
where
    S: Service<Request, Response = Response<Body>, Error = std::convert::Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let emitter = self.emitter.clone();
        let kind = self.kind.clone();
        let max_body_bytes = self.max_body_bytes;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let start = Instant::now();
            let Prepared {
                request,
                mut context,
                body: request_body,
            } = prepare(req, max_body_bytes).await;
            let method = request.method().clone();

            if let Kind::Action(options) = &kind {
                let emitter = emitter.clone();
                let options = options.clone();
                let mut context = context.clone();
                request_body.on_finish(move |body| {
                    context.body = body;
                    emitter.action(&context, &options);
                });
            }

            let response = inner.call(request).await;
            // A handler that never read its body is done with it now.
            request_body.finish();
            let response = response?;
            context.body = request_body.value();

            match kind {
                Kind::Action(options) if options.capture_response => {
                    let capture = ResponseCapture {
                        emitter,
                        options,
                        context,
                        request_body,
                        method,
                        start,
                    };
                    Ok(capture.stream(response, max_body_bytes))
                }
                Kind::Action(_) => Ok(response),
                Kind::Compliance(check_type) => {
                    if let Some(annotations) = response.extensions().get::<ComplianceAnnotations>() {
                        context.compliance = Some(annotations.clone());
                    }
                    emitter.compliance(&context, &check_type);
                    Ok(response)
                }
                Kind::Security {
                    event_type,
                    severity,
                } => {
                    if let Some(annotations) = response.extensions().get::<SecurityAnnotations>() {
                        context.security = Some(annotations.clone());
                    }
                    emitter.security(&context, &event_type, severity);
                    Ok(response)
                }
            }
        })
    }
}

/// State for emitting `<ACTION>_RESPONSE`.
struct ResponseCapture {
    emitter: AuditEmitter,
    options: Arc<ActionOptions>,
    context: RequestContext,
    request_body: BodyTap,
    method: Method,
    start: Instant,
}

impl ResponseCapture {
    /// Hand the response on at once. A JSON payload within the cap is copied
    /// as it streams and recorded when the body ends.
    fn stream(self, response: Response<Body>, max_body_bytes: usize) -> Response<Body> {
        let status = response.status();
        let (parts, body) = response.into_parts();
        let (body, payload) = tap_body(&parts.headers, body, max_body_bytes);

        let body = CompletionBody::new(body, move |outcome| {
            let mut completion =
                Completion::new(status.as_u16(), self.start.elapsed().as_millis() as u64)
                    .with_response_size(outcome.bytes);
            let response_error = outcome.error_for(&self.method, status);
            if let Some(error) = self.request_body.error().or(response_error) {
                completion = completion.with_error(error);
            }
            let payload = Some(payload.value()).filter(|v| !v.is_null());
            self.emitter.action_response(
                &self.context,
                &self.options,
                &completion,
                payload.as_ref(),
            );
        });
        Response::from_parts(parts, Body::new(body))
    }
}
