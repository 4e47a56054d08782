//! Access resolution
//!
//! Two independent gates decide whether a capability holder may act on a
//! module path:
//!
//! - **Subscription entitlement**: does the tenant's plan include the
//!   module at all. Skipped entirely in standalone deployments.
//! - **Capability**: does the holder's permission set authorize the path at
//!   exactly the depth requested. Never implied across levels.
//!
//! Collaborator failures fail closed: a lookup error denies, it never grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use suite_common::{DeploymentMode, TenantId, UserId};

use crate::cache::SubscriptionCache;
use crate::catalog::ModuleCatalog;
use crate::decision::{AccessDecision, AccessReason};
use crate::path::ModulePath;
use crate::AccessError;

/// A collaborator call failed (store down, lookup threw).
#[derive(Debug, Clone, Error)]
#[error("collaborator unavailable: {0}")]
pub struct LookupError(pub String);

/// Subscription lifecycle state as the resolver sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current
    Active,
    /// In a trial period
    Trialing,
    /// Payment failed; access suspended
    PastDue,
    /// Cancelled by the tenant
    Cancelled,
}

/// The entitlement view of a tenant's current subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// Plan identifier
    pub plan_id: String,
    /// Plan display name
    pub plan_name: String,
    /// Lifecycle status
    pub status: SubscriptionStatus,
    /// End of the current term, if bounded
    pub ends_at: Option<DateTime<Utc>>,
    /// Module codes the plan entitles
    pub modules: HashSet<String>,
    /// Modules the tenant has switched off despite entitlement
    pub disabled_modules: HashSet<String>,
}

impl SubscriptionState {
    /// True when this subscription currently grants module access: status is
    /// `Active` and the term has not ended.
    pub fn grants_access(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.ends_at.map(|ends| ends > now).unwrap_or(true)
    }
}

/// The capability holder an evaluation runs for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque user identifier
    pub user_id: UserId,
    /// Tenant scope; absent for platform-level users
    pub tenant_id: Option<TenantId>,
    /// Super-administrators bypass the capability gate (and only that gate)
    pub super_admin: bool,
}

impl Principal {
    /// A tenant-scoped principal.
    pub fn member(user_id: UserId, tenant_id: TenantId) -> Self {
        Self {
            user_id,
            tenant_id: Some(tenant_id),
            super_admin: false,
        }
    }

    /// A tenant-scoped super-administrator.
    pub fn super_admin(user_id: UserId, tenant_id: TenantId) -> Self {
        Self {
            user_id,
            tenant_id: Some(tenant_id),
            super_admin: true,
        }
    }
}

/// Resolves the tenant's current subscription
pub trait SubscriptionLookup: Send + Sync {
    /// The tenant's current subscription, or `None` when it has none.
    fn current_for(&self, tenant_id: TenantId) -> Result<Option<SubscriptionState>, LookupError>;
}

/// Resolves a principal's capability sets
pub trait CapabilityStore: Send + Sync {
    /// Permission names the principal holds, direct and role-derived.
    fn permissions_for(&self, principal: &Principal) -> Result<HashSet<String>, LookupError>;

    /// Role names assigned to the principal.
    fn roles_for(&self, principal: &Principal) -> Result<HashSet<String>, LookupError>;
}

/// Module access resolver
pub struct AccessResolver {
    mode: DeploymentMode,
    catalog: Arc<ModuleCatalog>,
    subscriptions: Arc<dyn SubscriptionLookup>,
    capabilities: Arc<dyn CapabilityStore>,
    cache: SubscriptionCache,
}

impl AccessResolver {
    /// Create a resolver with the default subscription cache TTL.
    pub fn new(
        mode: DeploymentMode,
        catalog: Arc<ModuleCatalog>,
        subscriptions: Arc<dyn SubscriptionLookup>,
        capabilities: Arc<dyn CapabilityStore>,
    ) -> Self {
        Self::with_cache_ttl(
            mode,
            catalog,
            subscriptions,
            capabilities,
            crate::cache::DEFAULT_SUBSCRIPTION_TTL,
        )
    }

    /// Create a resolver with an explicit subscription cache TTL.
    pub fn with_cache_ttl(
        mode: DeploymentMode,
        catalog: Arc<ModuleCatalog>,
        subscriptions: Arc<dyn SubscriptionLookup>,
        capabilities: Arc<dyn CapabilityStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            mode,
            catalog,
            subscriptions,
            capabilities,
            cache: SubscriptionCache::new(ttl),
        }
    }

    /// Evaluate access for a principal on a path.
    ///
    /// Always returns a decision; expected denials are values. The only error
    /// surface is malformed path input, which is rejected before a
    /// [`ModulePath`] can exist.
    pub fn resolve(&self, principal: &Principal, path: &ModulePath) -> AccessDecision {
        if !self.catalog.contains(path) {
            return AccessDecision::deny(AccessReason::NotFound)
                .with_meta("path", path.to_string());
        }

        match self.mode {
            DeploymentMode::Standalone => {
                self.check_capabilities(principal, path, AccessReason::StandaloneMode)
            }
            DeploymentMode::MultiTenant => self.resolve_multi_tenant(principal, path),
        }
    }

    /// Evaluate a dotted path string, e.g. `hrm.employees.list.view`.
    pub fn resolve_path(
        &self,
        principal: &Principal,
        raw_path: &str,
    ) -> Result<AccessDecision, AccessError> {
        let path = ModulePath::parse(raw_path)?;
        Ok(self.resolve(principal, &path))
    }

    /// Module-level check, e.g. may the principal enter `hrm` at all.
    pub fn can_access_module(
        &self,
        principal: &Principal,
        module: &str,
    ) -> Result<AccessDecision, AccessError> {
        let path = ModulePath::new(module, None, None, None)?;
        Ok(self.resolve(principal, &path))
    }

    /// Sub-module-level check. Does not imply any deeper or shallower level.
    pub fn can_access_sub_module(
        &self,
        principal: &Principal,
        module: &str,
        submodule: &str,
    ) -> Result<AccessDecision, AccessError> {
        let path = ModulePath::new(module, Some(submodule), None, None)?;
        Ok(self.resolve(principal, &path))
    }

    /// Component-level check. Does not imply any deeper or shallower level.
    pub fn can_access_component(
        &self,
        principal: &Principal,
        module: &str,
        submodule: &str,
        component: &str,
    ) -> Result<AccessDecision, AccessError> {
        let path = ModulePath::new(module, Some(submodule), Some(component), None)?;
        Ok(self.resolve(principal, &path))
    }

    /// Action-level check: the exact action capability must be granted.
    pub fn can_perform_action(
        &self,
        principal: &Principal,
        module: &str,
        submodule: &str,
        component: &str,
        action: &str,
    ) -> Result<AccessDecision, AccessError> {
        let path = ModulePath::new(module, Some(submodule), Some(component), Some(action))?;
        Ok(self.resolve(principal, &path))
    }

    /// Drop a tenant's cached subscription after a subscription change.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) {
        tracing::debug!(%tenant_id, "invalidating cached subscription");
        self.cache.invalidate(&tenant_id);
    }

    fn resolve_multi_tenant(&self, principal: &Principal, path: &ModulePath) -> AccessDecision {
        let Some(tenant_id) = principal.tenant_id else {
            return AccessDecision::deny(AccessReason::NoTenant);
        };

        let subscription = match self.subscription_for(tenant_id) {
            Ok(state) => state,
            Err(err) => {
                // Fail closed: an unreachable lookup never grants access.
                tracing::warn!(%tenant_id, error = %err, "subscription lookup failed; denying");
                return AccessDecision::deny(AccessReason::NoSubscription)
                    .with_message("subscription could not be verified")
                    .with_meta("lookup_error", err.to_string());
            }
        };

        let Some(subscription) = subscription else {
            return AccessDecision::deny(AccessReason::NoSubscription);
        };
        if !subscription.grants_access(Utc::now()) {
            return AccessDecision::deny(AccessReason::NoSubscription)
                .with_meta("current_plan", subscription.plan_id.clone());
        }

        let module = path.module();
        if !subscription.modules.contains(module) {
            return AccessDecision::deny(AccessReason::UpgradeRequired)
                .with_meta("current_plan", subscription.plan_id.clone())
                .with_meta("current_plan_name", subscription.plan_name.clone())
                .with_meta("module", module);
        }
        if subscription.disabled_modules.contains(module) {
            return AccessDecision::deny(AccessReason::PlanRestriction)
                .with_meta("current_plan", subscription.plan_id.clone())
                .with_meta("module", module);
        }

        self.check_capabilities(principal, path, AccessReason::Success)
    }

    fn check_capabilities(
        &self,
        principal: &Principal,
        path: &ModulePath,
        allow_reason: AccessReason,
    ) -> AccessDecision {
        if principal.super_admin {
            return AccessDecision::allow(allow_reason).with_meta("super_admin", "true");
        }

        let permissions = match self.capabilities.permissions_for(principal) {
            Ok(perms) => perms,
            Err(err) => {
                tracing::warn!(user_id = %principal.user_id, error = %err,
                    "capability lookup failed; denying");
                return AccessDecision::deny(AccessReason::InsufficientPermissions)
                    .with_message("permissions could not be verified")
                    .with_meta("lookup_error", err.to_string());
            }
        };

        // Exact match at the deepest supplied level only; a grant at a
        // related depth does not chain.
        let key = path.permission_key();
        if permissions.contains(&key) {
            AccessDecision::allow(allow_reason)
        } else {
            AccessDecision::deny(AccessReason::InsufficientPermissions)
                .with_meta("required_permission", key)
        }
    }

    fn subscription_for(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<SubscriptionState>, LookupError> {
        if let Some(cached) = self.cache.get(&tenant_id) {
            return Ok(cached);
        }
        let fresh = self.subscriptions.current_for(tenant_id)?;
        self.cache.insert(tenant_id, fresh.clone());
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct StaticSubscriptions {
        by_tenant: Mutex<HashMap<TenantId, Option<SubscriptionState>>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StaticSubscriptions {
        fn new() -> Self {
            Self {
                by_tenant: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn set(&self, tenant: TenantId, state: Option<SubscriptionState>) {
            self.by_tenant.lock().insert(tenant, state);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SubscriptionLookup for StaticSubscriptions {
        fn current_for(
            &self,
            tenant_id: TenantId,
        ) -> Result<Option<SubscriptionState>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError("store unreachable".into()));
            }
            Ok(self.by_tenant.lock().get(&tenant_id).cloned().flatten())
        }
    }

    struct StaticCapabilities {
        permissions: HashSet<String>,
        fail: bool,
    }

    impl StaticCapabilities {
        fn with(perms: &[&str]) -> Self {
            Self {
                permissions: perms.iter().map(|p| (*p).to_string()).collect(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                permissions: HashSet::new(),
                fail: true,
            }
        }
    }

    impl CapabilityStore for StaticCapabilities {
        fn permissions_for(&self, _: &Principal) -> Result<HashSet<String>, LookupError> {
            if self.fail {
                return Err(LookupError("capability store unreachable".into()));
            }
            Ok(self.permissions.clone())
        }

        fn roles_for(&self, _: &Principal) -> Result<HashSet<String>, LookupError> {
            Ok(HashSet::new())
        }
    }

    fn active_subscription(modules: &[&str]) -> SubscriptionState {
        SubscriptionState {
            plan_id: "business".into(),
            plan_name: "Business".into(),
            status: SubscriptionStatus::Active,
            ends_at: Some(Utc::now() + chrono::Duration::days(30)),
            modules: modules.iter().map(|m| (*m).to_string()).collect(),
            disabled_modules: HashSet::new(),
        }
    }

    fn resolver_with(
        mode: DeploymentMode,
        subscriptions: Arc<StaticSubscriptions>,
        capabilities: Arc<StaticCapabilities>,
    ) -> AccessResolver {
        AccessResolver::new(
            mode,
            Arc::new(ModuleCatalog::standard()),
            subscriptions,
            capabilities,
        )
    }

    #[test]
    fn test_saas_allow() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        subs.set(tenant, Some(active_subscription(&["hrm", "crm"])));
        let caps = Arc::new(StaticCapabilities::with(&["hrm.employees.list.view"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver
            .can_perform_action(&principal, "hrm", "employees", "list", "view")
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::Success);
        assert_eq!(decision.http_status, 200);
    }

    #[test]
    fn test_no_chaining_across_granularity_levels() {
        // A grant at hrm.employees.view does not satisfy the deeper
        // hrm.employees.list.view action check.
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        subs.set(tenant, Some(active_subscription(&["hrm", "crm"])));
        let caps = Arc::new(StaticCapabilities::with(&["hrm.employees.view"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver
            .can_perform_action(&principal, "hrm", "employees", "list", "view")
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::InsufficientPermissions);
        assert_eq!(decision.http_status, 403);
    }

    #[test]
    fn test_standalone_skips_subscription_gate() {
        // Same request as above, single-tenant deployment: no subscription
        // exists anywhere, yet the decision depends solely on permissions.
        let subs = Arc::new(StaticSubscriptions::new());
        let caps = Arc::new(StaticCapabilities::with(&["hrm.employees.list.view"]));
        let resolver = resolver_with(DeploymentMode::Standalone, subs.clone(), caps);

        let principal = Principal::member(Uuid::new_v4(), Uuid::new_v4());
        let decision = resolver
            .can_perform_action(&principal, "hrm", "employees", "list", "view")
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::StandaloneMode);
        assert_eq!(subs.calls(), 0);
    }

    #[test]
    fn test_missing_subscription_denies() {
        let subs = Arc::new(StaticSubscriptions::new());
        let caps = Arc::new(StaticCapabilities::with(&["hrm"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), Uuid::new_v4());
        let decision = resolver.can_access_module(&principal, "hrm").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::NoSubscription);
        assert_eq!(decision.http_status, 402);
    }

    #[test]
    fn test_expired_subscription_denies() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        let mut state = active_subscription(&["hrm"]);
        state.ends_at = Some(Utc::now() - chrono::Duration::days(1));
        subs.set(tenant, Some(state));
        let caps = Arc::new(StaticCapabilities::with(&["hrm"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver.can_access_module(&principal, "hrm").unwrap();
        assert_eq!(decision.reason, AccessReason::NoSubscription);
    }

    #[test]
    fn test_inactive_status_denies() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        let mut state = active_subscription(&["hrm"]);
        state.status = SubscriptionStatus::PastDue;
        subs.set(tenant, Some(state));
        let caps = Arc::new(StaticCapabilities::with(&["hrm"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver.can_access_module(&principal, "hrm").unwrap();
        assert_eq!(decision.reason, AccessReason::NoSubscription);
    }

    #[test]
    fn test_module_outside_plan_requires_upgrade() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        subs.set(tenant, Some(active_subscription(&["hrm"])));
        let caps = Arc::new(StaticCapabilities::with(&["inventory"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver.can_access_module(&principal, "inventory").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::UpgradeRequired);
        assert_eq!(decision.http_status, 402);
        assert_eq!(decision.meta.get("current_plan").unwrap(), "business");
    }

    #[test]
    fn test_disabled_module_is_plan_restricted() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        let mut state = active_subscription(&["hrm", "crm"]);
        state.disabled_modules.insert("crm".into());
        subs.set(tenant, Some(state));
        let caps = Arc::new(StaticCapabilities::with(&["crm"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver.can_access_module(&principal, "crm").unwrap();
        assert_eq!(decision.reason, AccessReason::PlanRestriction);
        assert_eq!(decision.http_status, 402);
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        subs.set(tenant, Some(active_subscription(&["hrm"])));
        let caps = Arc::new(StaticCapabilities::with(&[]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver.can_access_module(&principal, "timetravel").unwrap();
        assert_eq!(decision.reason, AccessReason::NotFound);
        assert_eq!(decision.http_status, 404);
    }

    #[test]
    fn test_missing_tenant_scope_denies() {
        let subs = Arc::new(StaticSubscriptions::new());
        let caps = Arc::new(StaticCapabilities::with(&["hrm"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal {
            user_id: Uuid::new_v4(),
            tenant_id: None,
            super_admin: false,
        };
        let decision = resolver.can_access_module(&principal, "hrm").unwrap();
        assert_eq!(decision.reason, AccessReason::NoTenant);
        assert_eq!(decision.http_status, 401);
    }

    #[test]
    fn test_super_admin_bypasses_capability_gate_only() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        subs.set(tenant, Some(active_subscription(&["hrm"])));
        let caps = Arc::new(StaticCapabilities::with(&[]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::super_admin(Uuid::new_v4(), tenant);

        // No permissions at all, yet the entitled module is allowed.
        let allowed = resolver
            .can_perform_action(&principal, "hrm", "payroll", "runs", "approve")
            .unwrap();
        assert!(allowed.allowed);

        // The subscription gate still applies: inventory is outside the plan.
        let denied = resolver.can_access_module(&principal, "inventory").unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.reason, AccessReason::UpgradeRequired);
    }

    #[test]
    fn test_subscription_lookup_failure_fails_closed() {
        let subs = Arc::new(StaticSubscriptions::failing());
        let caps = Arc::new(StaticCapabilities::with(&["hrm"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), Uuid::new_v4());
        let decision = resolver.can_access_module(&principal, "hrm").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::NoSubscription);
        assert!(decision.meta.contains_key("lookup_error"));
    }

    #[test]
    fn test_capability_lookup_failure_fails_closed() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        subs.set(tenant, Some(active_subscription(&["hrm"])));
        let caps = Arc::new(StaticCapabilities::failing());
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), tenant);
        let decision = resolver.can_access_module(&principal, "hrm").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::InsufficientPermissions);
        assert!(decision.meta.contains_key("lookup_error"));
    }

    #[test]
    fn test_subscription_cache_hits_and_invalidation() {
        let tenant = Uuid::new_v4();
        let subs = Arc::new(StaticSubscriptions::new());
        subs.set(tenant, Some(active_subscription(&["hrm"])));
        let caps = Arc::new(StaticCapabilities::with(&["hrm"]));
        let resolver = AccessResolver::with_cache_ttl(
            DeploymentMode::MultiTenant,
            Arc::new(ModuleCatalog::standard()),
            subs.clone(),
            caps,
            Duration::from_secs(300),
        );

        let principal = Principal::member(Uuid::new_v4(), tenant);
        for _ in 0..3 {
            resolver.can_access_module(&principal, "hrm").unwrap();
        }
        assert_eq!(subs.calls(), 1);

        resolver.invalidate_tenant(tenant);
        resolver.can_access_module(&principal, "hrm").unwrap();
        assert_eq!(subs.calls(), 2);
    }

    #[test]
    fn test_lookup_errors_are_not_cached() {
        let subs = Arc::new(StaticSubscriptions::failing());
        let caps = Arc::new(StaticCapabilities::with(&["hrm"]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs.clone(), caps);

        let principal = Principal::member(Uuid::new_v4(), Uuid::new_v4());
        resolver.can_access_module(&principal, "hrm").unwrap();
        resolver.can_access_module(&principal, "hrm").unwrap();
        // Each evaluation retried the collaborator instead of caching the error.
        assert_eq!(subs.calls(), 2);
    }

    #[test]
    fn test_resolve_path_rejects_malformed_input() {
        let subs = Arc::new(StaticSubscriptions::new());
        let caps = Arc::new(StaticCapabilities::with(&[]));
        let resolver = resolver_with(DeploymentMode::MultiTenant, subs, caps);

        let principal = Principal::member(Uuid::new_v4(), Uuid::new_v4());
        assert!(resolver.resolve_path(&principal, "").is_err());
    }
}
