//! TTL cache for subscription lookups
//!
//! The subscription gate fires on every access-gated request, so lookups are
//! cached per tenant for a bounded TTL. A stale-but-valid read inside the TTL
//! window is acceptable; subscription changes call
//! [`SubscriptionCache::invalidate`] to drop the tenant's entry early.

use moka::sync::Cache;
use std::time::Duration;
use suite_common::TenantId;

use crate::resolver::SubscriptionState;

/// Default TTL for cached subscription state.
pub const DEFAULT_SUBSCRIPTION_TTL: Duration = Duration::from_secs(300);

/// Per-tenant subscription cache with TTL eviction
///
/// `None` values are cached too: "tenant has no subscription" is as valid a
/// lookup result as a subscription. Lookup *errors* are never inserted.
pub struct SubscriptionCache {
    cache: Cache<TenantId, Option<SubscriptionState>>,
}

impl SubscriptionCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(65536)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Get the cached lookup result for a tenant, if still live.
    pub fn get(&self, tenant_id: &TenantId) -> Option<Option<SubscriptionState>> {
        self.cache.get(tenant_id)
    }

    /// Insert a lookup result for a tenant.
    pub fn insert(&self, tenant_id: TenantId, state: Option<SubscriptionState>) {
        self.cache.insert(tenant_id, state);
    }

    /// Drop a tenant's entry, forcing the next evaluation to re-resolve.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        self.cache.invalidate(tenant_id);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for SubscriptionCache {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIPTION_TTL)
    }
}
