//! Request classification heuristics.
//!
//! Every function here is total: malformed or empty paths produce the
//! `UNKNOWN`/`unknown` placeholders or `None`, never a panic.

use monay_audit_types::{AuditCategory, AuditSeverity, UNKNOWN_ACTION, UNKNOWN_RESOURCE};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("UUID pattern is a valid regex")
});

/// Category rules, evaluated in order. First match wins.
const CATEGORY_RULES: &[(&[&str], AuditCategory)] = &[
    (&["auth", "login", "logout"], AuditCategory::Authentication),
    (&["admin", "system"], AuditCategory::System),
    (&["users", "profile"], AuditCategory::UserManagement),
    (&["transactions", "payments", "wallets"], AuditCategory::Financial),
    (&["compliance", "kyc", "aml"], AuditCategory::Compliance),
];

fn segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty())
}

/// Verb suffix for an HTTP method.
pub fn method_verb(method: &str) -> String {
    match method.to_ascii_uppercase().as_str() {
        "GET" => "VIEW".to_string(),
        "POST" => "CREATE".to_string(),
        "PUT" | "PATCH" => "UPDATE".to_string(),
        "DELETE" => "DELETE".to_string(),
        "" => UNKNOWN_ACTION.to_string(),
        other => other.to_string(),
    }
}

/// Synthesize `<LAST_SEGMENT>_<VERB>`, e.g. `POST /api/users` → `USERS_CREATE`.
pub fn derive_action(method: &str, path: &str) -> String {
    match segments(path).last() {
        Some(segment) => format!("{}_{}", segment.to_uppercase(), method_verb(method)),
        None => UNKNOWN_ACTION.to_string(),
    }
}

/// First path segment after an optional leading `api`.
pub fn derive_resource(path: &str) -> String {
    let mut parts = segments(path).peekable();
    if parts.peek() == Some(&"api") {
        parts.next();
    }
    parts
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string())
}

/// Explicit `id` route parameter, else the first UUID found in the path.
pub fn derive_resource_id(path: &str, params: &HashMap<String, String>) -> Option<String> {
    if let Some(id) = params.get("id").filter(|id| !id.is_empty()) {
        return Some(id.clone());
    }
    UUID_PATTERN.find(path).map(|m| m.as_str().to_string())
}

/// Category from ordered substring rules over the path.
pub fn derive_category(path: &str) -> AuditCategory {
    let path = path.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| path.contains(n)))
        .map(|(_, category)| *category)
        .unwrap_or(AuditCategory::General)
}

/// Severity of a lifecycle-captured event.
pub fn derive_severity(status: u16) -> AuditSeverity {
    AuditSeverity::from_status(status)
}
