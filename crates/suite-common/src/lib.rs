//! OpenSuite Common - Shared types for the multi-tenant ERP core
//!
//! This crate provides the primitives shared by the access-control and
//! revenue crates:
//! - Tenant and user identifiers
//! - Deployment mode (standalone vs multi-tenant)
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant ID
pub type TenantId = Uuid;

/// User ID
pub type UserId = Uuid;

/// How the suite is deployed.
///
/// Resolved once at startup from configuration and injected into the
/// components that care. In `Standalone` deployments there is a single
/// implicit tenant and subscription entitlement checks do not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Single-tenant installation; every module is entitled.
    Standalone,
    /// Multi-tenant SaaS installation; module access is gated by the
    /// tenant's subscription.
    MultiTenant,
}

impl DeploymentMode {
    /// Parse a mode from its configuration string.
    pub fn from_config(value: &str) -> SuiteResult<Self> {
        match value {
            "standalone" => Ok(Self::Standalone),
            "saas" | "multi_tenant" => Ok(Self::MultiTenant),
            other => Err(SuiteError::UnknownDeploymentMode(other.to_string())),
        }
    }

    /// True when subscription entitlement checks apply.
    pub fn is_multi_tenant(&self) -> bool {
        matches!(self, Self::MultiTenant)
    }
}
