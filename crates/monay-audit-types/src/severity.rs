//! Audit event severity levels.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::{Display, EnumString};

/// Severity level for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AuditSeverity {
    /// Request completed normally.
    Info,
    /// Client-side failure (4xx).
    Warning,
    /// Server-side failure (5xx).
    Error,
    /// Security-relevant event.
    Security,
    /// Security event requiring immediate attention.
    Critical,
}

impl AuditSeverity {
    /// Severity of a lifecycle-captured event, derived from the final
    /// response status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            500.. => Self::Error,
            400..=499 => Self::Warning,
            _ => Self::Info,
        }
    }

    /// Numeric value for comparison (higher = more severe).
    pub fn level(&self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
            Self::Security => 3,
            Self::Critical => 4,
        }
    }

    /// Check if this severity meets a minimum threshold.
    pub fn meets_threshold(&self, threshold: Self) -> bool {
        self.level() >= threshold.level()
    }
}

impl PartialOrd for AuditSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AuditSeverity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

impl Default for AuditSeverity {
    fn default() -> Self {
        Self::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (200, AuditSeverity::Info),
            (201, AuditSeverity::Info),
            (400, AuditSeverity::Warning),
            (404, AuditSeverity::Warning),
            (500, AuditSeverity::Error),
            (503, AuditSeverity::Error),
        ];
        for (status, expected) in cases {
            assert_eq!(AuditSeverity::from_status(status), expected, "status {status}");
        }
    }

    #[test]
    fn test_redirects_and_informational_are_info() {
        assert_eq!(AuditSeverity::from_status(101), AuditSeverity::Info);
        assert_eq!(AuditSeverity::from_status(302), AuditSeverity::Info);
        assert_eq!(AuditSeverity::from_status(399), AuditSeverity::Info);
    }

    #[test]
    fn test_ordering() {
        assert!(AuditSeverity::Critical > AuditSeverity::Security);
        assert!(AuditSeverity::Security > AuditSeverity::Error);
        assert!(AuditSeverity::Warning.meets_threshold(AuditSeverity::Info));
        assert!(!AuditSeverity::Info.meets_threshold(AuditSeverity::Warning));
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(serde_json::to_string(&AuditSeverity::Warning).unwrap(), "\"WARNING\"");
        assert_eq!(AuditSeverity::Security.to_string(), "SECURITY");
        assert_eq!("critical".parse::<AuditSeverity>().unwrap(), AuditSeverity::Critical);
    }

    proptest! {
        #[test]
        fn status_severity_is_never_security(status in 0u16..1000) {
            let severity = AuditSeverity::from_status(status);
            prop_assert!(severity <= AuditSeverity::Error);
        }
    }
}
