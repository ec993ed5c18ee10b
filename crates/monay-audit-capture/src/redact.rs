//! Sensitive data redaction.
//!
//! Redaction is a pure deep copy: any map key whose lowercased name contains
//! one of the markers has its value replaced by [`REDACTED`], at any depth.

use serde_json::{Map, Value};

/// Replacement written over sensitive values.
pub const REDACTED: &str = "[REDACTED]";

/// Markers applied to request and response bodies.
pub const BODY_MARKERS: &[&str] = &["password", "token", "secret", "apiKey", "privateKey"];

/// Markers applied to request headers.
pub const HEADER_MARKERS: &[&str] = &["authorization", "cookie", "x-api-key", "x-auth-token"];

/// Financial PII markers added on top of the body set for compliance payloads.
pub const COMPLIANCE_MARKERS: &[&str] = &["ssn", "taxId", "bankAccount"];

/// Case-insensitive set of substrings marking a key as sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSet {
    markers: Vec<String>,
}

impl MarkerSet {
    /// Build a set from arbitrary markers. Empty markers are ignored since
    /// they would match every key.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::default().extend(markers)
    }

    /// Default body markers.
    pub fn body() -> Self {
        Self::new(BODY_MARKERS)
    }

    /// Default header markers.
    pub fn headers() -> Self {
        Self::new(HEADER_MARKERS)
    }

    /// Body markers plus financial PII.
    pub fn compliance() -> Self {
        Self::body().extend(COMPLIANCE_MARKERS)
    }

    /// Add markers to the set.
    pub fn extend<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for marker in markers {
            let marker = marker.as_ref().trim().to_lowercase();
            if !marker.is_empty() && !self.markers.contains(&marker) {
                self.markers.push(marker);
            }
        }
        self
    }

    /// Whether `key` names a sensitive field.
    pub fn matches(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.markers.iter().any(|m| key.contains(m.as_str()))
    }

    /// Iterate over the normalized markers.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(String::as_str)
    }

    /// No markers, so nothing is redacted.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Return a deep copy of `value` with every sensitive field replaced.
pub fn redact(value: &Value, markers: &MarkerSet) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_map(map, markers)),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact(v, markers)).collect()),
        other => other.clone(),
    }
}

fn redact_map(map: &Map<String, Value>, markers: &MarkerSet) -> Map<String, Value> {
    map.iter()
        .map(|(key, val)| {
            let val = if markers.matches(key) {
                Value::String(REDACTED.to_string())
            } else {
                redact(val, markers)
            };
            (key.clone(), val)
        })
        .collect()
}

/// Convert header pairs into an ordered map, redacting sensitive names.
///
/// Repeated headers are joined with `", "`.
pub fn redact_headers<'a, I>(headers: I, markers: &MarkerSet) -> Map<String, Value>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = Map::new();
    for (name, value) in headers {
        let name = name.to_lowercase();
        let value = if markers.matches(&name) {
            REDACTED.to_string()
        } else {
            value.to_string()
        };
        match out.get_mut(&name) {
            Some(Value::String(existing)) if existing != REDACTED => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            Some(_) => {}
            None => {
                out.insert(name, Value::String(value));
            }
        }
    }
    out
}
