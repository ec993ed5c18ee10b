//! Event assembly and the typed emitters.
//!
//! [`AuditEmitter`] is shared by the lifecycle interceptor and the three
//! typed entry points. Every `build_*` method is pure assembly; the matching
//! non-`build` method hands the result to [`AuditCapture`].

use crate::capture::AuditCapture;
use crate::classify::{derive_action, derive_category, derive_resource, derive_resource_id};
use crate::config::AuditConfig;
use crate::context::{Completion, RequestContext};
use crate::redact::{redact, redact_headers, MarkerSet, COMPLIANCE_MARKERS};
use monay_audit_types::{
    AuditCategory, AuditDetails, AuditEvent, AuditEventBuilder, AuditMetadata, AuditSeverity,
};
use serde_json::{json, Value};

/// Overrides for the named-action emitter. Unset fields fall back to the
/// classifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOptions {
    pub action: String,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub severity: Option<AuditSeverity>,
    pub category: Option<AuditCategory>,
    /// Also emit `<ACTION>_RESPONSE` once the response is known.
    pub capture_response: bool,
}

impl ActionOptions {
    /// Options for `action` with classifier defaults.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    /// Override the resource name.
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Override the resource id.
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Override the severity of the action event.
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Override the category.
    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Also emit `<ACTION>_RESPONSE`.
    pub fn capture_response(mut self, enabled: bool) -> Self {
        self.capture_response = enabled;
        self
    }

    /// Action name of the follow-up response event.
    pub fn response_action(&self) -> String {
        format!("{}_RESPONSE", self.action)
    }
}

/// Builds events from request context and forwards them to the capture
/// channel.
#[derive(Debug, Clone)]
pub struct AuditEmitter {
    capture: AuditCapture,
    body_markers: MarkerSet,
    header_markers: MarkerSet,
    compliance_markers: MarkerSet,
}

impl AuditEmitter {
    /// Emitter using the redaction markers from `config`.
    pub fn new(capture: AuditCapture, config: &AuditConfig) -> Self {
        let body_markers = config.body_markers();
        Self {
            capture,
            compliance_markers: body_markers.clone().extend(COMPLIANCE_MARKERS),
            body_markers,
            header_markers: MarkerSet::headers(),
        }
    }

    /// Replace the header redaction markers.
    pub fn with_header_markers(mut self, markers: MarkerSet) -> Self {
        self.header_markers = markers;
        self
    }

    /// Capture handle events are recorded on.
    pub fn capture(&self) -> &AuditCapture {
        &self.capture
    }

    /// Lifecycle event for a completed request.
    pub fn build_request_event(&self, ctx: &RequestContext, completion: &Completion) -> AuditEvent {
        let mut details = self.details(ctx, &self.body_markers);
        details.status_code = Some(completion.status);
        details.duration_ms = Some(completion.duration_ms);

        let mut metadata = self.metadata(ctx);
        metadata.response_size = completion.response_size;
        metadata.error = completion.error.clone();

        self.base_builder(ctx, derive_action(&ctx.method, &ctx.path))
            .details(details)
            .metadata(metadata)
            .severity(AuditSeverity::from_status(completion.status))
            .build()
    }

    /// Record the lifecycle event for a completed request.
    pub fn request_completed(&self, ctx: &RequestContext, completion: &Completion) -> bool {
        self.capture.record(self.build_request_event(ctx, completion))
    }

    /// "Before" event for an explicitly named business action.
    pub fn build_action_event(&self, ctx: &RequestContext, options: &ActionOptions) -> AuditEvent {
        let mut builder = self
            .action_builder(ctx, options, &options.action)
            .details(self.details(ctx, &self.body_markers))
            .metadata(self.metadata(ctx));
        if let Some(severity) = options.severity {
            builder = builder.severity(severity);
        }
        builder.build()
    }

    /// Record the "before" event for a named action.
    pub fn action(&self, ctx: &RequestContext, options: &ActionOptions) -> bool {
        self.capture.record(self.build_action_event(ctx, options))
    }

    /// `<ACTION>_RESPONSE` event carrying the redacted response payload.
    /// Severity always follows the final status.
    pub fn build_action_response_event(
        &self,
        ctx: &RequestContext,
        options: &ActionOptions,
        completion: &Completion,
        payload: Option<&Value>,
    ) -> AuditEvent {
        let mut details = self.details(ctx, &self.body_markers);
        details.status_code = Some(completion.status);
        details.duration_ms = Some(completion.duration_ms);

        let mut metadata = self.metadata(ctx);
        metadata.response_size = completion.response_size;
        metadata.error = completion.error.clone();
        if let Some(payload) = payload {
            metadata
                .extra
                .insert("response".to_string(), redact(payload, &self.body_markers));
        }

        self.action_builder(ctx, options, &options.response_action())
            .details(details)
            .metadata(metadata)
            .severity(AuditSeverity::from_status(completion.status))
            .build()
    }

    /// Record the `<ACTION>_RESPONSE` event.
    pub fn action_response(
        &self,
        ctx: &RequestContext,
        options: &ActionOptions,
        completion: &Completion,
        payload: Option<&Value>,
    ) -> bool {
        self.capture
            .record(self.build_action_response_event(ctx, options, completion, payload))
    }

    /// `COMPLIANCE_<TYPE>` event with the stricter PII redaction.
    pub fn build_compliance_event(&self, ctx: &RequestContext, check_type: &str) -> AuditEvent {
        let mut metadata = self.metadata(ctx);
        metadata.extra.insert("checkType".to_string(), json!(check_type));
        if let Some(annotations) = &ctx.compliance {
            metadata
                .extra
                .insert("regulations".to_string(), json!(annotations.regulations));
            if let Some(score) = annotations.risk_score {
                metadata.extra.insert("riskScore".to_string(), json!(score));
            }
            for (key, value) in &annotations.extra {
                metadata.extra.insert(key.clone(), value.clone());
            }
        }

        self.base_builder(ctx, format!("COMPLIANCE_{}", action_token(check_type)))
            .category(AuditCategory::Compliance)
            .details(self.details(ctx, &self.compliance_markers))
            .metadata(metadata)
            .severity(AuditSeverity::Info)
            .build()
    }

    /// Record a compliance check event.
    pub fn compliance(&self, ctx: &RequestContext, check_type: &str) -> bool {
        self.capture.record(self.build_compliance_event(ctx, check_type))
    }

    /// `SECURITY_<TYPE>` event; severity defaults to `SECURITY`.
    pub fn build_security_event(
        &self,
        ctx: &RequestContext,
        event_type: &str,
        severity: Option<AuditSeverity>,
    ) -> AuditEvent {
        let mut metadata = self.metadata(ctx);
        metadata.extra.insert("eventType".to_string(), json!(event_type));
        if let Some(annotations) = &ctx.security {
            if let Some(level) = &annotations.threat_level {
                metadata.extra.insert("threatLevel".to_string(), json!(level));
            }
            if let Some(vector) = &annotations.attack_vector {
                metadata.extra.insert("attackVector".to_string(), json!(vector));
            }
            if let Some(mitigated) = annotations.mitigated {
                metadata.extra.insert("mitigated".to_string(), json!(mitigated));
            }
            for (key, value) in &annotations.extra {
                metadata.extra.insert(key.clone(), value.clone());
            }
        }

        self.base_builder(ctx, format!("SECURITY_{}", action_token(event_type)))
            .category(AuditCategory::Security)
            .details(self.details(ctx, &self.body_markers))
            .metadata(metadata)
            .severity(severity.unwrap_or(AuditSeverity::Security))
            .build()
    }

    /// Record a security event.
    pub fn security(
        &self,
        ctx: &RequestContext,
        event_type: &str,
        severity: Option<AuditSeverity>,
    ) -> bool {
        self.capture
            .record(self.build_security_event(ctx, event_type, severity))
    }

    fn base_builder(&self, ctx: &RequestContext, action: String) -> AuditEventBuilder {
        AuditEvent::builder(action, derive_resource(&ctx.path))
            .resource_id(derive_resource_id(&ctx.path, &ctx.params))
            .category(derive_category(&ctx.path))
            .user_id(ctx.identity.user_id.clone())
            .tenant_id(ctx.identity.tenant_id.clone())
            .session_id(ctx.identity.session_id.clone())
            .ip_address(ctx.client_ip())
            .user_agent(ctx.user_agent())
    }

    fn action_builder(
        &self,
        ctx: &RequestContext,
        options: &ActionOptions,
        action: &str,
    ) -> AuditEventBuilder {
        let mut builder = self.base_builder(ctx, action.to_string());
        if let Some(resource) = &options.resource {
            builder = builder.resource(resource.clone());
        }
        if let Some(id) = &options.resource_id {
            builder = builder.resource_id(Some(id.clone()));
        }
        if let Some(category) = options.category {
            builder = builder.category(category);
        }
        builder
    }

    fn details(&self, ctx: &RequestContext, markers: &MarkerSet) -> AuditDetails {
        AuditDetails {
            method: ctx.method.to_uppercase(),
            path: ctx.path.clone(),
            query: ctx.query.clone(),
            body: redact(&ctx.body, markers),
            status_code: None,
            duration_ms: None,
        }
    }

    fn metadata(&self, ctx: &RequestContext) -> AuditMetadata {
        let headers = ctx.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()));
        AuditMetadata {
            headers: redact_headers(headers, &self.header_markers),
            ..Default::default()
        }
    }
}

/// Uppercase a caller-supplied type name into an action token.
fn action_token(raw: &str) -> String {
    let token: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    if token.is_empty() {
        monay_audit_types::UNKNOWN_ACTION.to_string()
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureConfig;
    use crate::context::{AuditIdentity, ComplianceAnnotations, SecurityAnnotations};
    use crate::redact::REDACTED;

    fn emitter() -> (AuditEmitter, tokio::sync::mpsc::Receiver<std::sync::Arc<AuditEvent>>) {
        let (capture, receiver) = AuditCapture::new(&CaptureConfig::default());
        (AuditEmitter::new(capture, &AuditConfig::default()), receiver)
    }

    fn payment_request() -> RequestContext {
        RequestContext::new("post", "/api/payments")
            .with_body(json!({"amount": 50, "cardToken": "tok_abc"}))
            .with_header("Authorization", "Bearer abc")
            .with_header("Content-Type", "application/json")
            .with_header("User-Agent", "monay-ios/4.2")
            .with_header("X-Forwarded-For", "203.0.113.7")
            .with_identity(AuditIdentity::user("usr_1").with_tenant("tnt_1").with_session("ses_1"))
    }

    #[test]
    fn test_request_event() {
        let (emitter, _rx) = emitter();
        let completion = Completion::new(201, 12).with_response_size(48);
        let event = emitter.build_request_event(&payment_request(), &completion);

        assert_eq!(event.action, "PAYMENTS_CREATE");
        assert_eq!(event.resource, "payments");
        assert_eq!(event.category, AuditCategory::Financial);
        assert_eq!(event.severity, AuditSeverity::Info);
        assert_eq!(event.details.method, "POST");
        assert_eq!(event.details.status_code, Some(201));
        assert_eq!(event.details.duration_ms, Some(12));
        assert_eq!(event.details.body["cardToken"], REDACTED);
        assert_eq!(event.details.body["amount"], 50);
        assert_eq!(event.metadata.headers["authorization"], REDACTED);
        assert_eq!(event.metadata.headers["content-type"], "application/json");
        assert_eq!(event.metadata.response_size, Some(48));
        assert_eq!(event.user_id.as_deref(), Some("usr_1"));
        assert_eq!(event.tenant_id.as_deref(), Some("tnt_1"));
        assert_eq!(event.session_id.as_deref(), Some("ses_1"));
        assert_eq!(event.ip_address, "203.0.113.7");
        assert_eq!(event.user_agent.as_deref(), Some("monay-ios/4.2"));
    }

    #[test]
    fn test_request_event_severity_from_status() {
        let (emitter, _rx) = emitter();
        let ctx = payment_request();
        let warn = emitter.build_request_event(&ctx, &Completion::new(404, 1));
        let err = emitter
            .build_request_event(&ctx, &Completion::new(503, 1).with_error("upstream timeout"));
        assert_eq!(warn.severity, AuditSeverity::Warning);
        assert_eq!(err.severity, AuditSeverity::Error);
        assert_eq!(err.metadata.error.as_deref(), Some("upstream timeout"));
    }

    #[tokio::test]
    async fn test_request_completed_records_once() {
        let (emitter, mut rx) = emitter();
        assert!(emitter.request_completed(&payment_request(), &Completion::new(201, 3)));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.action, "PAYMENTS_CREATE");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_action_event_overrides() {
        let (emitter, _rx) = emitter();
        let options = ActionOptions::new("WALLET_FREEZE")
            .resource("wallets")
            .resource_id("wal_9")
            .severity(AuditSeverity::Warning)
            .category(AuditCategory::Security);
        let ctx = RequestContext::new("POST", "/api/admin/freeze");

        let event = emitter.build_action_event(&ctx, &options);

        assert_eq!(event.action, "WALLET_FREEZE");
        assert_eq!(event.resource, "wallets");
        assert_eq!(event.resource_id.as_deref(), Some("wal_9"));
        assert_eq!(event.severity, AuditSeverity::Warning);
        assert_eq!(event.category, AuditCategory::Security);
        assert_eq!(event.details.status_code, None);
    }

    #[test]
    fn test_action_event_defaults_to_classifier() {
        let (emitter, _rx) = emitter();
        let ctx = RequestContext::new("POST", "/api/users/550e8400-e29b-41d4-a716-446655440000");
        let event = emitter.build_action_event(&ctx, &ActionOptions::new("USER_INVITE"));

        assert_eq!(event.resource, "users");
        assert_eq!(
            event.resource_id.as_deref(),
            Some("550e8400-e29b-41d4-a716-446655440000")
        );
        assert_eq!(event.category, AuditCategory::UserManagement);
        assert_eq!(event.severity, AuditSeverity::Info);
    }

    #[test]
    fn test_action_response_event() {
        let (emitter, _rx) = emitter();
        let options = ActionOptions::new("API_KEY_ROTATE").severity(AuditSeverity::Security);
        let payload = json!({"id": "key_1", "apiKey": "sk_live_123"});
        let event = emitter.build_action_response_event(
            &RequestContext::new("POST", "/api/keys/rotate"),
            &options,
            &Completion::new(500, 40),
            Some(&payload),
        );

        assert_eq!(event.action, "API_KEY_ROTATE_RESPONSE");
        assert_eq!(event.severity, AuditSeverity::Error);
        assert_eq!(event.metadata.extra["response"]["id"], "key_1");
        assert_eq!(event.metadata.extra["response"]["apiKey"], REDACTED);
    }

    #[test]
    fn test_compliance_event() {
        let (emitter, _rx) = emitter();
        let mut extra = serde_json::Map::new();
        extra.insert("watchlistHit".to_string(), json!(false));
        let ctx = RequestContext::new("POST", "/api/kyc/verify")
            .with_body(json!({"name": "A", "ssn": "123-45-6789", "profile": {"taxId": "77"}}))
            .with_compliance(ComplianceAnnotations {
                regulations: vec!["BSA".into(), "KYC".into()],
                risk_score: Some(72.5),
                extra,
            });

        let event = emitter.build_compliance_event(&ctx, "kyc-verification");

        assert_eq!(event.action, "COMPLIANCE_KYC_VERIFICATION");
        assert_eq!(event.category, AuditCategory::Compliance);
        assert_eq!(event.details.body["ssn"], REDACTED);
        assert_eq!(event.details.body["profile"]["taxId"], REDACTED);
        assert_eq!(event.details.body["name"], "A");
        assert_eq!(event.metadata.extra["regulations"], json!(["BSA", "KYC"]));
        assert_eq!(event.metadata.extra["riskScore"], json!(72.5));
        assert_eq!(event.metadata.extra["watchlistHit"], json!(false));
        assert_eq!(event.metadata.extra["checkType"], "kyc-verification");
    }

    #[test]
    fn test_compliance_markers_not_applied_to_lifecycle() {
        let (emitter, _rx) = emitter();
        let ctx = RequestContext::new("POST", "/api/users").with_body(json!({"ssn": "1"}));
        let event = emitter.build_request_event(&ctx, &Completion::new(200, 1));
        assert_eq!(event.details.body["ssn"], "1");
    }

    #[test]
    fn test_security_event() {
        let (emitter, _rx) = emitter();
        let ctx = RequestContext::new("POST", "/api/auth/login").with_security(SecurityAnnotations {
            threat_level: Some("high".into()),
            attack_vector: Some("credential_stuffing".into()),
            mitigated: Some(true),
            ..Default::default()
        });

        let event = emitter.build_security_event(&ctx, "brute force", None);
        assert_eq!(event.action, "SECURITY_BRUTE_FORCE");
        assert_eq!(event.category, AuditCategory::Security);
        assert_eq!(event.severity, AuditSeverity::Security);
        assert_eq!(event.metadata.extra["threatLevel"], "high");
        assert_eq!(event.metadata.extra["attackVector"], "credential_stuffing");
        assert_eq!(event.metadata.extra["mitigated"], true);

        let critical = emitter.build_security_event(&ctx, "breach", Some(AuditSeverity::Critical));
        assert_eq!(critical.severity, AuditSeverity::Critical);
    }

    #[test]
    fn test_action_token() {
        assert_eq!(action_token("aml-screening"), "AML_SCREENING");
        assert_eq!(action_token("  "), "UNKNOWN");
        assert_eq!(action_token("Sanctions List"), "SANCTIONS_LIST");
    }
}
