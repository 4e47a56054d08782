//! Access decisions
//!
//! Expected denials are values, not errors: every evaluation produces an
//! [`AccessDecision`] the caller branches on. The HTTP status is informative
//! for the transport boundary; nothing here enforces it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why an evaluation allowed or denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// Allowed in multi-tenant mode; both gates passed.
    Success,
    /// Allowed in standalone mode; the subscription gate was skipped.
    StandaloneMode,
    /// No current subscription, or the subscription is inactive or expired.
    NoSubscription,
    /// The tenant's plan does not include the requested module.
    UpgradeRequired,
    /// The plan includes the module but it is disabled for this tenant.
    PlanRestriction,
    /// The path is not registered in the module catalog.
    NotFound,
    /// The capability set does not authorize the path at its exact depth.
    InsufficientPermissions,
    /// Multi-tenant mode but the principal carries no tenant scope.
    NoTenant,
}

impl AccessReason {
    /// HTTP-equivalent status for this reason.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success | Self::StandaloneMode => 200,
            Self::NoTenant => 401,
            Self::NoSubscription | Self::UpgradeRequired | Self::PlanRestriction => 402,
            Self::InsufficientPermissions => 403,
            Self::NotFound => 404,
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            Self::Success => "access granted",
            Self::StandaloneMode => "access granted (standalone deployment)",
            Self::NoSubscription => "no active subscription",
            Self::UpgradeRequired => "current plan does not include this module",
            Self::PlanRestriction => "module is disabled for this tenant",
            Self::NotFound => "unknown module path",
            Self::InsufficientPermissions => "insufficient permissions",
            Self::NoTenant => "no tenant scope",
        }
    }
}

/// Result of one access evaluation
///
/// Produced fresh per evaluation and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Whether access is granted
    pub allowed: bool,
    /// Reason code for the outcome
    pub reason: AccessReason,
    /// Human-readable message
    pub message: String,
    /// HTTP-equivalent status for the transport boundary
    pub http_status: u16,
    /// Additional context (plan, path, collaborator errors)
    pub meta: HashMap<String, String>,
}

impl AccessDecision {
    /// An allow decision with the reason's default message.
    pub fn allow(reason: AccessReason) -> Self {
        Self::build(true, reason)
    }

    /// A deny decision with the reason's default message.
    pub fn deny(reason: AccessReason) -> Self {
        Self::build(false, reason)
    }

    fn build(allowed: bool, reason: AccessReason) -> Self {
        Self {
            allowed,
            reason,
            message: reason.default_message().to_string(),
            http_status: reason.http_status(),
            meta: HashMap::new(),
        }
    }

    /// Attach a meta entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Replace the default message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Serialize for the transport boundary.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AccessReason::Success.http_status(), 200);
        assert_eq!(AccessReason::StandaloneMode.http_status(), 200);
        assert_eq!(AccessReason::NoTenant.http_status(), 401);
        assert_eq!(AccessReason::NoSubscription.http_status(), 402);
        assert_eq!(AccessReason::UpgradeRequired.http_status(), 402);
        assert_eq!(AccessReason::PlanRestriction.http_status(), 402);
        assert_eq!(AccessReason::InsufficientPermissions.http_status(), 403);
        assert_eq!(AccessReason::NotFound.http_status(), 404);
    }

    #[test]
    fn test_json_uses_snake_case_reasons() {
        let decision = AccessDecision::deny(AccessReason::InsufficientPermissions);
        let json = decision.to_json();
        assert!(json.contains("\"insufficient_permissions\""));
        assert!(json.contains("\"http_status\":403"));
    }

    #[test]
    fn test_denials_carry_consistent_status() {
        let denial = AccessDecision::deny(AccessReason::UpgradeRequired)
            .with_meta("current_plan", "starter");
        assert!(!denial.allowed);
        assert_eq!(denial.http_status, 402);
        assert_eq!(denial.meta.get("current_plan").unwrap(), "starter");
    }
}
