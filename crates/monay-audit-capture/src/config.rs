//! Audit pipeline configuration.
//!
//! Normally built in code by the embedding application. It can also be read
//! from YAML, with `${VAR}` / `${VAR:-default}` expansion, and overridden
//! from `MONAY_AUDIT_*` environment variables.

use crate::capture::CaptureConfig;
use crate::error::ConfigError;
use crate::redact::{MarkerSet, BODY_MARKERS};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable names.
pub mod vars {
    /// Audit `GET` requests too (`true`/`false`).
    pub const LOG_READS: &str = "MONAY_AUDIT_LOG_READS";
    /// Comma-separated excluded path prefixes.
    pub const EXCLUDE_PATHS: &str = "MONAY_AUDIT_EXCLUDE_PATHS";
    /// Comma-separated audited methods.
    pub const INCLUDE_METHODS: &str = "MONAY_AUDIT_INCLUDE_METHODS";
    /// Comma-separated body redaction markers.
    pub const SENSITIVE_FIELDS: &str = "MONAY_AUDIT_SENSITIVE_FIELDS";
    /// Body capture cap in bytes.
    pub const MAX_BODY_BYTES: &str = "MONAY_AUDIT_MAX_BODY_BYTES";
}

static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("env reference pattern is a valid regex")
});

/// Which requests are observed and how they are sanitized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Path prefixes that are never audited.
    pub exclude_paths: Vec<String>,
    /// Methods audited when read logging is off.
    pub include_methods: Vec<String>,
    /// Audit every method, including `GET`.
    pub log_read_requests: bool,
    /// Redaction markers for request and response bodies.
    pub sensitive_fields: Vec<String>,
    /// Largest body (in bytes) parsed into an audit record.
    pub max_body_bytes: usize,
    /// Delivery channel settings.
    pub capture: CaptureConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            exclude_paths: ["/health", "/metrics", "/docs", "/api-docs", "/favicon.ico"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            include_methods: ["POST", "PUT", "PATCH", "DELETE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_read_requests: false,
            sensitive_fields: BODY_MARKERS.iter().map(|s| s.to_string()).collect(),
            max_body_bytes: 64 * 1024,
            capture: CaptureConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the excluded path prefixes.
    pub fn with_exclude_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the audited methods.
    pub fn with_include_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable auditing of read requests.
    pub fn with_log_read_requests(mut self, enabled: bool) -> Self {
        self.log_read_requests = enabled;
        self
    }

    /// Replace the body redaction markers.
    pub fn with_sensitive_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add body redaction markers on top of the current set.
    pub fn add_sensitive_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Set the body size cap.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Set the delivery channel settings.
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Body markers as a [`MarkerSet`].
    pub fn body_markers(&self) -> MarkerSet {
        MarkerSet::new(&self.sensitive_fields)
    }

    /// Inclusion decision for a request.
    ///
    /// Evaluated in order: excluded prefix, `GET` without read logging,
    /// method outside the included set without read logging.
    pub fn should_audit(&self, method: &str, path: &str) -> bool {
        if self.exclude_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        if self.log_read_requests {
            return true;
        }
        if method.eq_ignore_ascii_case("GET") {
            return false;
        }
        self.include_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: AuditConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.exclude_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Validation {
                message: format!("exclude path '{}' must start with '/'", bad),
            });
        }
        if let Some(bad) = self
            .include_methods
            .iter()
            .find(|m| m.is_empty() || !m.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(ConfigError::Validation {
                message: format!("'{}' is not an HTTP method", bad),
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Validation {
                message: "max_body_bytes must be greater than 0".to_string(),
            });
        }
        if self.capture.buffer_size == 0 {
            return Err(ConfigError::Validation {
                message: "capture.buffer_size must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Apply `MONAY_AUDIT_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup, then validate the
    /// result.
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup(vars::LOG_READS) {
            self.log_read_requests = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(v) = lookup(vars::EXCLUDE_PATHS) {
            self.exclude_paths = split_list(&v);
        }
        if let Some(v) = lookup(vars::INCLUDE_METHODS) {
            self.include_methods = split_list(&v)
                .into_iter()
                .map(|m| m.to_uppercase())
                .collect();
        }
        if let Some(v) = lookup(vars::SENSITIVE_FIELDS) {
            self.sensitive_fields = split_list(&v);
        }
        if let Some(v) = lookup(vars::MAX_BODY_BYTES) {
            self.max_body_bytes = v.trim().parse().map_err(|_| ConfigError::Validation {
                message: format!("{} must be a byte count, got '{}'", vars::MAX_BODY_BYTES, v),
            })?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let expanded = ENV_REF.replace_all(content, |caps: &regex::Captures<'_>| {
        let var = &caps[1];
        match std::env::var(var) {
            Ok(v) => v,
            Err(_) => match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| var.to_string());
                    String::new()
                }
            },
        }
    });
    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(expanded.into_owned()),
    }
}
