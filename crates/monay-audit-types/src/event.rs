//! Core audit event type.

use crate::{AuditCategory, AuditEventId, AuditSeverity, UNKNOWN_ACTION, UNKNOWN_RESOURCE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event identifier.
    pub id: AuditEventId,
    /// When the event was built.
    pub timestamp: DateTime<Utc>,
    /// Authenticated actor, absent for anonymous requests.
    pub user_id: Option<String>,
    /// Tenant scope.
    pub tenant_id: Option<String>,
    /// Verb+resource token such as `USERS_CREATE`, or an explicit action name.
    pub action: String,
    /// Coarse resource name.
    pub resource: String,
    /// Identifier of the touched resource.
    pub resource_id: Option<String>,
    /// What the request did.
    pub details: AuditDetails,
    /// Context around the request.
    pub metadata: AuditMetadata,
    /// Resolved client address.
    pub ip_address: String,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Session the request belonged to.
    pub session_id: Option<String>,
    /// Event severity.
    pub severity: AuditSeverity,
    /// Event category.
    pub category: AuditCategory,
}

/// Request shape and outcome recorded in [`AuditEvent::details`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    /// HTTP method.
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// Decoded query parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub query: Map<String, Value>,
    /// Redacted request body.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    /// Final response status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Wall-clock time from acceptance to response completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Supplementary context recorded in [`AuditEvent::metadata`].
///
/// Domain extras (risk score, threat level, regulations) live in `extra` and
/// are flattened into the serialized object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMetadata {
    /// Redacted request headers.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    /// Bytes written in the response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    /// Error message, if the request or response failed mid-flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Emitter-specific extras.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditEvent {
    /// Create a new event builder.
    pub fn builder(action: impl Into<String>, resource: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder::new(action, resource)
    }

    /// Whether this event came from a failed request.
    pub fn is_failure(&self) -> bool {
        self.details.status_code.is_some_and(|s| s >= 400) || self.metadata.error.is_some()
    }
}

/// Builder for constructing audit events.
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    action: String,
    resource: String,
    resource_id: Option<String>,
    category: AuditCategory,
    severity: Option<AuditSeverity>,
    user_id: Option<String>,
    tenant_id: Option<String>,
    session_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: AuditDetails,
    metadata: AuditMetadata,
}

impl AuditEventBuilder {
    /// Create a new builder.
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            category: AuditCategory::General,
            severity: None,
            user_id: None,
            tenant_id: None,
            session_id: None,
            ip_address: None,
            user_agent: None,
            details: AuditDetails::default(),
            metadata: AuditMetadata::default(),
        }
    }

    /// Replace the action.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Replace the resource.
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Set the resource identifier.
    pub fn resource_id(mut self, id: Option<String>) -> Self {
        self.resource_id = id;
        self
    }

    /// Set the category.
    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the severity explicitly. Otherwise it is derived from the status
    /// code in the details, or `INFO` when there is none.
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Set the actor.
    pub fn user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the tenant.
    pub fn tenant_id(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Set the session.
    pub fn session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Set IP address.
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Set user agent.
    pub fn user_agent(mut self, ua: Option<String>) -> Self {
        self.user_agent = ua;
        self
    }

    /// Set the request details.
    pub fn details(mut self, details: AuditDetails) -> Self {
        self.details = details;
        self
    }

    /// Set the metadata block.
    pub fn metadata(mut self, metadata: AuditMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single metadata extra.
    pub fn extra(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json) = serde_json::to_value(value) {
            self.metadata.extra.insert(key.into(), json);
        }
        self
    }

    /// Build the event.
    pub fn build(self) -> AuditEvent {
        let severity = self.severity.unwrap_or_else(|| {
            self.details
                .status_code
                .map(AuditSeverity::from_status)
                .unwrap_or_default()
        });

        AuditEvent {
            id: AuditEventId::new(),
            timestamp: Utc::now(),
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            action: non_empty_or(self.action, UNKNOWN_ACTION),
            resource: non_empty_or(self.resource, UNKNOWN_RESOURCE),
            resource_id: self.resource_id,
            details: self.details,
            metadata: self.metadata,
            ip_address: self.ip_address.unwrap_or_else(|| "unknown".to_string()),
            user_agent: self.user_agent,
            session_id: self.session_id,
            severity,
            category: self.category,
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
