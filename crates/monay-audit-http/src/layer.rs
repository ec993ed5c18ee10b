//! Request lifecycle audit middleware.

use crate::body::CompletionBody;
use crate::extract::{prepare, Prepared};
use axum::{
    body::Body,
    extract::Request,
    http::Response,
};
use futures::future::BoxFuture;
use monay_audit_capture::{AuditCapture, AuditConfig, AuditEmitter, AuditSink, Completion};
use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::debug;

/// Audits every request the inclusion policy selects.
///
/// One event is recorded per observed request, after its response body has
/// finished streaming.
#[derive(Clone)]
pub struct AuditLayer {
    emitter: AuditEmitter,
    config: Arc<AuditConfig>,
}

impl AuditLayer {
    /// Layer over an existing emitter.
    pub fn new(emitter: AuditEmitter, config: AuditConfig) -> Self {
        Self {
            emitter,
            config: Arc::new(config),
        }
    }

    /// Start a delivery loop for `sink` and build a layer on top of it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        let capture = AuditCapture::spawn(sink, &config.capture);
        let emitter = AuditEmitter::new(capture, &config);
        Self::new(emitter, config)
    }

    /// Emitter shared with the typed audit layers.
    pub fn emitter(&self) -> &AuditEmitter {
        &self.emitter
    }

    /// Inclusion policy and limits in effect.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditMiddleware {
            inner,
            emitter: self.emitter.clone(),
            config: self.config.clone(),
        }
    }
}

/// Service produced by [`AuditLayer`].
#[derive(Clone)]
pub struct AuditMiddleware<S> {
    inner: S,
    emitter: AuditEmitter,
    config: Arc<AuditConfig>,
}

impl<S> Service<Request> for AuditMiddleware<S>
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
        let config = self.config.clone();
        let emitter = self.emitter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !config.should_audit(req.method().as_str(), req.uri().path()) {
                return inner.call(req).await;
            }

            let start = Instant::now();
            let Prepared {
                request,
                mut context,
                body: request_body,
            } = prepare(req, config.max_body_bytes).await;
            let method = request.method().clone();

            let response = inner.call(request).await?;
            let status_code = response.status();
            let status = status_code.as_u16();
            debug!(
                method = %context.method,
                path = %context.path,
                status,
                "Audited request answered"
            );

            let (parts, body) = response.into_parts();
            let body = CompletionBody::new(body, move |outcome| {
                context.body = request_body.value();
                let mut completion = Completion::new(status, start.elapsed().as_millis() as u64)
                    .with_response_size(outcome.bytes);
                let response_error = outcome.error_for(&method, status_code);
                if let Some(error) = request_body.error().or(response_error) {
                    completion = completion.with_error(error);
                }
                emitter.request_completed(&context, &completion);
            });

            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}
