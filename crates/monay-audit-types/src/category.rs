//! Audit event categories.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Compliance taxonomy bucket downstream tooling filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AuditCategory {
    /// Login, logout, token handling.
    Authentication,
    /// User and profile changes.
    UserManagement,
    /// Transactions, payments, wallets.
    Financial,
    /// KYC, AML and other compliance checks.
    Compliance,
    /// Threats and policy violations.
    Security,
    /// Administrative and system operations.
    System,
    /// Anything else.
    General,
}

impl AuditCategory {
    /// Get all categories.
    pub fn all() -> impl Iterator<Item = Self> {
        use strum::IntoEnumIterator;
        Self::iter()
    }

    /// Categories whose records regulators commonly require to be retained
    /// beyond the default window.
    pub fn requires_extended_retention(&self) -> bool {
        matches!(
            self,
            Self::Authentication | Self::Financial | Self::Compliance | Self::Security
        )
    }
}

impl Default for AuditCategory {
    fn default() -> Self {
        Self::General
    }
}
