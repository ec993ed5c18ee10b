//! Building a [`RequestContext`] from an axum request.

use crate::body::{BodyTap, TeeBody};
use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, RawPathParams, Request};
use axum::http::{header, request::Parts, HeaderMap};
use monay_audit_capture::{
    AuditIdentity, ComplianceAnnotations, RequestContext, SecurityAnnotations,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Route parameters supplied explicitly by the application.
///
/// Takes precedence over the parameters axum matched for the route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditRouteParams(pub HashMap<String, String>);

impl AuditRouteParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// Request with a tapped body, plus what the audit record needs.
pub(crate) struct Prepared {
    pub request: Request,
    /// `context.body` is filled from `body` once the handler has read it.
    pub context: RequestContext,
    pub body: BodyTap,
}

/// Snapshot the request into a [`RequestContext`].
///
/// A JSON body is not read here. It is wrapped so that the bytes the handler
/// reads are copied, up to `max_body_bytes`, into the returned tap.
pub(crate) async fn prepare(request: Request, max_body_bytes: usize) -> Prepared {
    let (mut parts, body) = request.into_parts();
    let context = context_from_parts(&mut parts).await;

    let (body, tap) = tap_body(&parts.headers, body, max_body_bytes);

    Prepared {
        request: Request::from_parts(parts, body),
        context,
        body: tap,
    }
}

/// Wrap a JSON body whose declared length fits the cap. Anything else is
/// handed on as is with a disabled tap.
pub(crate) fn tap_body(headers: &HeaderMap, body: Body, max_body_bytes: usize) -> (Body, BodyTap) {
    let oversize = content_length(headers).is_some_and(|len| len > max_body_bytes as u64);
    if !is_json(headers) || oversize {
        return (body, BodyTap::disabled());
    }
    let tap = BodyTap::new(max_body_bytes);
    (Body::new(TeeBody::new(body, tap.clone())), tap)
}

async fn context_from_parts(parts: &mut Parts) -> RequestContext {
    let mut context = RequestContext::new(parts.method.as_str(), parts.uri.path());
    context.query = parse_query(parts.uri.query());
    context.headers = header_pairs(&parts.headers);
    context.remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    context.identity = parts
        .extensions
        .get::<AuditIdentity>()
        .cloned()
        .unwrap_or_default();
    context.compliance = parts.extensions.get::<ComplianceAnnotations>().cloned();
    context.security = parts.extensions.get::<SecurityAnnotations>().cloned();

    context.params = match parts.extensions.get::<AuditRouteParams>() {
        Some(params) => params.0.clone(),
        None => match RawPathParams::from_request_parts(parts, &()).await {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        },
    };

    context
}

/// Decode a query string. Repeated keys collect into an array.
pub(crate) fn parse_query(query: Option<&str>) -> Map<String, Value> {
    let mut out = Map::new();
    let Some(query) = query else {
        return out;
    };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match out.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                out.insert(key.into_owned(), value);
            }
        }
    }
    out
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("[non-utf8]");
            (name.as_str().to_string(), value.to_string())
        })
        .collect()
}

pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
