//! Explicit per-request context threaded into event construction.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::IpAddr;

/// Who made the request, as established by upstream authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditIdentity {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
}

impl AuditIdentity {
    /// Identity for an authenticated user.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    /// Tenant the user acted within.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Session the request belongs to.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Compliance findings a handler computed before the compliance emitter runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplianceAnnotations {
    /// Regulations the request touches, e.g. `["BSA", "GDPR"]`.
    pub regulations: Vec<String>,
    pub risk_score: Option<f64>,
    /// Additional fields copied verbatim into event metadata.
    pub extra: Map<String, Value>,
}

/// Threat assessment attached before the security emitter runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityAnnotations {
    pub threat_level: Option<String>,
    pub attack_vector: Option<String>,
    pub mitigated: Option<bool>,
    /// Additional fields copied verbatim into event metadata.
    pub extra: Map<String, Value>,
}

/// Everything the pipeline knows about a request before it completes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub query: Map<String, Value>,
    /// Route parameters captured by the router.
    pub params: HashMap<String, String>,
    /// Parsed JSON body, `Null` when absent or not JSON.
    pub body: Value,
    /// Raw header pairs in arrival order.
    pub headers: Vec<(String, String)>,
    /// Address of the directly connected peer.
    pub remote_addr: Option<IpAddr>,
    pub identity: AuditIdentity,
    pub compliance: Option<ComplianceAnnotations>,
    pub security: Option<SecurityAnnotations>,
}

impl RequestContext {
    /// Context for `method` on `path`, everything else empty.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add a decoded query value.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a matched route parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set the parsed JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Append a raw header pair.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the connected peer address.
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set who made the request.
    pub fn with_identity(mut self, identity: AuditIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Attach compliance findings.
    pub fn with_compliance(mut self, annotations: ComplianceAnnotations) -> Self {
        self.compliance = Some(annotations);
        self
    }

    /// Attach a threat assessment.
    pub fn with_security(mut self, annotations: SecurityAnnotations) -> Self {
        self.security = Some(annotations);
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Client address: first `x-forwarded-for` hop, then `x-real-ip`, then
    /// the connected peer, else `"unknown"`.
    pub fn client_ip(&self) -> String {
        self.header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.header("x-real-ip")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
            .map(String::from)
            .or_else(|| self.remote_addr.map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// `user-agent` header, if sent.
    pub fn user_agent(&self) -> Option<String> {
        self.header("user-agent").map(String::from)
    }
}

/// What is known once the response has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub status: u16,
    pub duration_ms: u64,
    /// Response body bytes written.
    pub response_size: Option<u64>,
    /// Failure while reading the request or streaming the response.
    pub error: Option<String>,
}

impl Completion {
    /// Completion with `status` after `duration_ms`.
    pub fn new(status: u16, duration_ms: u64) -> Self {
        Self {
            status,
            duration_ms,
            ..Default::default()
        }
    }

    /// Record the response body size.
    pub fn with_response_size(mut self, bytes: u64) -> Self {
        self.response_size = Some(bytes);
        self
    }

    /// Record a request or response failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_client_ip_precedence() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));
        let ctx = RequestContext::new("POST", "/api/users").with_remote_addr(peer);
        assert_eq!(ctx.client_ip(), "10.0.0.9");

        let ctx = ctx.with_header("X-Real-IP", "198.51.100.4");
        assert_eq!(ctx.client_ip(), "198.51.100.4");

        let ctx = ctx.with_header("X-Forwarded-For", "203.0.113.7, 10.0.0.1");
        assert_eq!(ctx.client_ip(), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_unknown() {
        let ctx = RequestContext::new("POST", "/").with_header("x-forwarded-for", " ");
        assert_eq!(ctx.client_ip(), "unknown");
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let ctx = RequestContext::new("GET", "/").with_header("User-Agent", "curl/8.0");
        assert_eq!(ctx.user_agent().as_deref(), Some("curl/8.0"));
        assert_eq!(ctx.header("USER-AGENT"), Some("curl/8.0"));
    }
}
